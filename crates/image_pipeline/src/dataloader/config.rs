//! src/dataloader/config.rs
//!
//! Configuration for BatchLoader behaviour
//!
//! Example:
//! ```ignore
//! let config = PipelineConfig::builder()
//!     .batch_size(64)
//!     .batch_count(32)
//!     .num_workers(16)
//!     .shuffle(true)
//!     .seed(42)
//!     .build();
//! ```
//!
//! # Memory considerations:
//! - The sample arena holds `batch_size * batch_count` decoded images of
//!   `image_size * image_size * 3` bytes each (64 * 32 * 224 * 224 * 3 ≈ 308 MB
//!   with the defaults). Reduce `batch_count` first if that is too much.
//! - `num_workers` does not affect memory, only decode throughput.

use anyhow::{ensure, Result};
use std::time::Duration;

/// What the coordinator does when a worker cannot decode an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// Surface the error from the iterator and stop loading.
    #[default]
    Halt,
    /// Log the failure and load the next source sample into the same slot.
    Skip,
}

/// Configuration for BatchLoader
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of samples per batch
    pub batch_size: usize,
    /// Number of batches in flight (arena holds `batch_size * batch_count` slots)
    pub batch_count: usize,
    /// Number of decode worker threads
    pub num_workers: usize,
    /// Whether to visit the files in a random order
    pub shuffle: bool,
    /// Base seed for the shuffle order (random when `None`)
    pub seed: Option<u64>,
    /// Epoch mixed into the shuffle seed
    pub epoch: usize,
    /// Side length of the square output images
    pub image_size: u32,
    /// Short side the image is conceptually rescaled to before the center crop
    pub resize_base: u32,
    /// How decode failures are handled
    pub decode_error_policy: DecodeErrorPolicy,
    /// Maximum time to wait for a single completion. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            batch_count: 32,
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            shuffle: true,
            seed: None,
            epoch: 0,
            image_size: 224,
            resize_base: 256,
            decode_error_policy: DecodeErrorPolicy::Halt,
            timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Bytes in one arena slot (one decoded HWC RGB8 image).
    pub fn slot_len(&self) -> usize {
        self.image_size as usize * self.image_size as usize * 3
    }

    /// Total number of arena slots.
    pub fn slot_count(&self) -> usize {
        self.batch_size * self.batch_count
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "Batch size must be greater than 0");
        ensure!(self.batch_count > 0, "Batch count must be greater than 0");
        ensure!(
            self.num_workers > 0,
            "Cannot run the pipeline with 0 workers"
        );
        ensure!(self.image_size > 0, "Image size must be greater than 0");
        ensure!(
            self.resize_base >= self.image_size,
            "resize_base ({}) must be at least image_size ({})",
            self.resize_base,
            self.image_size
        );
        if let Some(timeout) = self.timeout {
            ensure!(!timeout.is_zero(), "Timeout must be non-zero when set");
        }
        Ok(())
    }
}

/// Builder for PipelineConfig with method chaining
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set how many batches may be in flight at once
    pub fn batch_count(mut self, count: usize) -> Self {
        self.config.batch_count = count;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set whether to shuffle the file order
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the random seed for a reproducible shuffle order.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Set the epoch; with a fixed seed each epoch gets its own order.
    pub fn epoch(mut self, epoch: usize) -> Self {
        self.config.epoch = epoch;
        self
    }

    /// Set the output image side and the short side used for the center crop.
    pub fn image_geometry(mut self, image_size: u32, resize_base: u32) -> Self {
        self.config.image_size = image_size;
        self.config.resize_base = resize_base;
        self
    }

    pub fn decode_error_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.config.decode_error_policy = policy;
        self
    }

    /// Fail instead of blocking forever when no completion arrives in time.
    ///
    /// - Too low: May fail during legitimately slow decodes
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
