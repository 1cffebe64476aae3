//! src/dataloader/common/mod.rs
//!
//! Utilities shared by the coordinator and the workers.

pub mod thread;
