//! Vision transforms used by the sample workers.
//!
//! ```text
//! transforms/vision/
//! ├── io.rs         → file read + decode (LoadImage)
//! └── geometric.rs  → EnsureRGB, CenterCropResize (bilinear over a fractional box)
//! ```
//!
//! The default worker pipeline is
//! `LoadImage -> EnsureRGB -> CenterCropResize`, see [`decode_pipeline`].

pub mod geometric;
pub mod io;

pub use geometric::{CenterCropResize, CropBox, EnsureRGB};
pub use io::LoadImage;

use crate::transforms::{Chain, Transform};
use anyhow::Result;
use image::{DynamicImage, RgbImage};

/// Path -> decoded -> RGB8 -> center-cropped square.
pub type DecodePipeline =
    Chain<Chain<LoadImage, EnsureRGB, DynamicImage>, CenterCropResize, RgbImage>;

/// Builds the standard worker pipeline producing `size` x `size` RGB images.
pub fn decode_pipeline(size: u32, resize_base: u32) -> Result<DecodePipeline> {
    Ok(LoadImage::new()
        .then(EnsureRGB)
        .then(CenterCropResize::new(size, resize_base)?))
}
