//! Multi-threaded image loading for training and evaluation loops.
//!
//! Files listed by [`readers::ImageFolder`] are visited in a lazily shuffled
//! order ([`sampler::ShuffledIndices`]), decoded and center-cropped by a pool
//! of worker threads into a fixed slot arena, and handed out as complete
//! [`dataloader::Batch`]es by [`dataloader::BatchLoader`].

pub mod dataloader;
pub mod readers;
pub mod sampler;
pub mod transforms;

pub use dataloader::{Batch, BatchLoader, DecodeErrorPolicy, PipelineConfig, ShutdownReport};
pub use readers::{CategoryMap, ImageFolder};
