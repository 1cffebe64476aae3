//! src/dataloader/mod.rs
//!
//! Shuffled, batch-aligned, multi-threaded image loading.
//!
//! # Architecture Overview
//!
//! ```text
//!   file list + CategoryMap        Sampler (sequential / sparse shuffle)
//!              │                              │
//!              └──────────────┬───────────────┘
//!                             ↓
//!                     ┌───────────────┐   WorkerTask::Load(slot, path, buffer)
//!                     │  BatchLoader  │ ─────────────────────────┐
//!                     │ (coordinator) │                          ↓
//!                     └───────┬───────┘                 [Worker Threads]
//!                             ↑                   decode → RGB → crop+resize
//!                             │   WorkerOutput::Loaded(slot, buffer)  │
//!                             └───────────────────────────────────────┘
//!                             │
//!                             ↓ full batch
//!                        ┌─────────┐
//!                        │  Batch  │ ── dropped → slots back to the arena,
//!                        └─────────┘    batch refilled from the source
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs          # Public API exports + architecture docs
//! ├── config.rs       # PipelineConfig, builder, and validation
//! ├── loader.rs       # BatchLoader: batch coordinator + iterator
//! ├── arena.rs        # Fixed-size slot arena
//! ├── batch.rs        # Batch (release token)
//! ├── workers/
//! │   ├── mod.rs      # WorkerTask / WorkerOutput + worker loop
//! │   └── pool.rs     # WorkerPool<Task, Output>
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs   # Thread-local worker ID
//! ```
//!
//! # Memory Usage
//! - Fixed: `batch_size * batch_count * image_size² * 3` bytes, allocated once.
//! - At most `batch_count` batches are queued or held by the caller; holding
//!   all of them and asking for another is an error, not a deadlock.

mod arena;
mod batch;
mod common;
mod config;
mod loader;
mod workers;

// Public re-exports
pub use arena::SlotBuffer;
pub use batch::Batch;
pub use common::thread::{current_worker_id, WORKER_ID};
pub use config::{DecodeErrorPolicy, PipelineConfig, PipelineConfigBuilder};
pub use loader::BatchLoader;
pub use workers::pool::ShutdownReport;
