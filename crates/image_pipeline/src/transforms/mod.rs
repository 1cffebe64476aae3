//! Composable per-sample transforms.
//!
//! Workers run one `Transform<PathBuf, RgbImage>` per work item; the default
//! one is built by [`vision::decode_pipeline`].

pub mod core;
pub mod vision;

pub use core::{Chain, Transform};
