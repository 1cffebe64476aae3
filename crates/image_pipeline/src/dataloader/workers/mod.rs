//! Worker side of the pipeline.
//!
//! - `pool`: thread pool sharing one work queue and one completion queue
//!
//! Workers receive [`WorkerTask`]s and answer every `Load` with exactly one
//! [`WorkerOutput`] carrying the slot buffer back, whether decoding worked
//! or not. `Shutdown` is the per-worker termination sentinel.

pub(crate) mod pool;

use anyhow::{anyhow, ensure, Error, Result};
use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, trace};

use crate::dataloader::arena::SlotBuffer;
use crate::dataloader::common::thread::current_worker_id;
use crate::transforms::Transform;

/// Work queue message.
#[derive(Debug)]
pub enum WorkerTask {
    /// Decode `path` into `buffer`, which belongs to arena slot `slot`.
    Load {
        slot: usize,
        path: PathBuf,
        buffer: SlotBuffer,
    },
    /// Termination sentinel, one per worker.
    Shutdown,
}

/// Completion queue message. The slot buffer always comes back.
#[derive(Debug)]
pub enum WorkerOutput {
    Loaded {
        slot: usize,
        buffer: SlotBuffer,
    },
    Failed {
        slot: usize,
        path: PathBuf,
        buffer: SlotBuffer,
        error: Error,
    },
}

/// Runs `transform` on `path` and writes the raw HWC bytes into `buffer`.
pub(crate) fn decode_into<T>(transform: &T, path: PathBuf, buffer: &mut [u8]) -> Result<()>
where
    T: Transform<PathBuf, RgbImage> + ?Sized,
{
    let image = transform.apply(path)?;
    let raw = image.as_raw();
    ensure!(
        raw.len() == buffer.len(),
        "Decoded image is {}x{} ({} bytes) but the slot holds {} bytes",
        image.width(),
        image.height(),
        raw.len(),
        buffer.len()
    );
    buffer.copy_from_slice(raw);
    Ok(())
}

/// Worker loop: block on the work queue until a sentinel arrives or the
/// queue closes.
pub(crate) fn run_worker<T>(transform: &T, task_rx: Receiver<WorkerTask>, output_tx: Sender<WorkerOutput>)
where
    T: Transform<PathBuf, RgbImage> + ?Sized,
{
    let worker_id = current_worker_id();
    while let Ok(task) = task_rx.recv() {
        match task {
            WorkerTask::Shutdown => {
                debug!(worker_id, "received shutdown sentinel");
                return;
            }
            WorkerTask::Load {
                slot,
                path,
                mut buffer,
            } => {
                trace!(worker_id, slot, path = %path.display(), "loading sample");
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    decode_into(transform, path.clone(), &mut buffer)
                }))
                .unwrap_or_else(|_| Err(anyhow!("Decoder panicked on {}", path.display())));
                let output = match result {
                    Ok(()) => WorkerOutput::Loaded { slot, buffer },
                    Err(error) => WorkerOutput::Failed {
                        slot,
                        path,
                        buffer,
                        error: error.context(format!("Worker {} failed", worker_id)),
                    },
                };
                if output_tx.send(output).is_err() {
                    // Coordinator is gone, nothing left to report to.
                    return;
                }
            }
        }
    }
    debug!(worker_id, "work queue closed");
}
