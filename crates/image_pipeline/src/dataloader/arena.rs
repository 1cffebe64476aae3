//! Fixed-size slot arena backing every image the pipeline produces.
//!
//! All `batch_size * batch_count` slot buffers are allocated once when the
//! loader is built and then only move around:
//!
//! ```text
//!   arena ──take──▶ WorkerTask::Load ──▶ WorkerOutput ──put──▶ arena
//!     ▲                                                          │
//!     └────────── put (release) ◀── Batch (caller) ◀──take_range─┘
//! ```
//!
//! Exactly one party owns a slot at any time, so workers write without locks
//! and a slot cannot be refilled while the caller still reads it.

use anyhow::{anyhow, ensure, Result};
use std::ops::Range;

/// One decoded image, `image_size * image_size * 3` bytes, HWC RGB8.
pub type SlotBuffer = Box<[u8]>;

#[derive(Debug)]
pub(crate) struct SampleArena {
    slot_len: usize,
    slots: Vec<Option<SlotBuffer>>,
}

impl SampleArena {
    pub(crate) fn new(slot_count: usize, slot_len: usize) -> Self {
        let slots = (0..slot_count)
            .map(|_| Some(vec![0u8; slot_len].into_boxed_slice()))
            .collect();
        Self { slot_len, slots }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Moves the buffer of `slot` out of the arena.
    pub(crate) fn take(&mut self, slot: usize) -> Result<SlotBuffer> {
        let len = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| anyhow!("Slot {} out of range ({} slots)", slot, len))?
            .take()
            .ok_or_else(|| anyhow!("Slot {} is not in the arena (already handed out)", slot))
    }

    /// Returns a buffer to `slot`.
    pub(crate) fn put(&mut self, slot: usize, buffer: SlotBuffer) -> Result<()> {
        ensure!(
            buffer.len() == self.slot_len,
            "Buffer for slot {} has {} bytes, expected {}",
            slot,
            buffer.len(),
            self.slot_len
        );
        let len = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| anyhow!("Slot {} out of range ({} slots)", slot, len))?;
        ensure!(entry.is_none(), "Slot {} returned twice", slot);
        *entry = Some(buffer);
        Ok(())
    }

    /// Moves every buffer in `range` out, in slot order.
    pub(crate) fn take_range(&mut self, range: Range<usize>) -> Result<Vec<SlotBuffer>> {
        range.map(|slot| self.take(slot)).collect()
    }

    /// Returns `buffers` to consecutive slots starting at `start`.
    pub(crate) fn put_range(&mut self, start: usize, buffers: Vec<SlotBuffer>) -> Result<()> {
        for (offset, buffer) in buffers.into_iter().enumerate() {
            self.put(start + offset, buffer)?;
        }
        Ok(())
    }

    /// Number of slots currently owned by the arena.
    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
