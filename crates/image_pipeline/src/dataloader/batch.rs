//! Completed batches handed to the caller.
//!
//! A [`Batch`] owns its slot buffers while the caller uses it and doubles as
//! the release token: dropping it (or calling [`Batch::release`]) gives the
//! buffers back to the loader, which refills that batch from the source.
//! Because `Drop` runs on every exit path, a batch is released exactly once
//! even when the training step bails out with an error.

use anyhow::{ensure, Result};
use crossbeam_channel::Sender;
use std::path::PathBuf;

use super::arena::SlotBuffer;

/// Slot buffers travelling back to the coordinator.
#[derive(Debug)]
pub(crate) struct ReleasedBatch {
    pub(crate) num: usize,
    pub(crate) buffers: Vec<SlotBuffer>,
}

/// A full batch of decoded images with their labels.
///
/// Images are `[height, width, 3]` RGB8, so the batch as a whole reads as an
/// NHWC `uint8` tensor of [`Batch::shape`].
#[derive(Debug)]
pub struct Batch {
    num: usize,
    image_size: usize,
    buffers: Vec<SlotBuffer>,
    labels: Vec<usize>,
    indices: Vec<usize>,
    paths: Vec<PathBuf>,
    release_tx: Option<Sender<ReleasedBatch>>,
}

impl Batch {
    pub(crate) fn new(
        num: usize,
        image_size: usize,
        buffers: Vec<SlotBuffer>,
        labels: Vec<usize>,
        indices: Vec<usize>,
        paths: Vec<PathBuf>,
        release_tx: Sender<ReleasedBatch>,
    ) -> Result<Self> {
        let len = buffers.len();
        ensure!(
            labels.len() == len && indices.len() == len && paths.len() == len,
            "Batch {} metadata does not match its {} images",
            num,
            len
        );
        Ok(Self {
            num,
            image_size,
            buffers,
            labels,
            indices,
            paths,
            release_tx: Some(release_tx),
        })
    }

    /// Which arena batch (`0..batch_count`) this is.
    pub fn num(&self) -> usize {
        self.num
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), self.image_size, self.image_size, 3]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Source indices (positions in the file list) of the images.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Raw HWC bytes of image `i`.
    pub fn image(&self, i: usize) -> Option<&[u8]> {
        self.buffers.get(i).map(|b| &b[..])
    }

    pub fn images(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.buffers.iter().map(|b| &b[..])
    }

    /// Copies the batch into one contiguous NHWC buffer.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffers.iter().map(|b| b.len()).sum());
        for buffer in &self.buffers {
            out.extend_from_slice(buffer);
        }
        out
    }

    /// NHWC `uint8` tensor copy of the batch.
    #[cfg(feature = "tch")]
    pub fn to_tensor(&self) -> tch::Tensor {
        let [n, h, w, c] = self.shape();
        tch::Tensor::from_slice(&self.to_contiguous()).view([n as i64, h as i64, w as i64, c as i64])
    }

    /// Gives the slots back to the loader. Same as dropping the batch.
    pub fn release(mut self) {
        self.send_release();
    }

    fn send_release(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            let released = ReleasedBatch {
                num: self.num,
                buffers: std::mem::take(&mut self.buffers),
            };
            // Fails only when the loader is gone, and then nobody needs the slots.
            let _ = tx.send(released);
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.send_release();
    }
}
