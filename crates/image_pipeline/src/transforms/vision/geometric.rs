use crate::transforms::Transform;
use anyhow::{anyhow, ensure, Result};
use fast_image_resize::images::Image as FirImage;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, RgbImage};

// ============================================================================
// EnsureRGB
// ============================================================================
/// Normalizes any decoded image (grayscale, RGBA, 16-bit, ...) to 3-channel RGB8.
#[derive(Debug, Clone)]
pub struct EnsureRGB;

impl Transform<DynamicImage, RgbImage> for EnsureRGB {
    fn apply(&self, img: DynamicImage) -> Result<RgbImage> {
        Ok(match img {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
    }
}

// ============================================================================
// CenterCropResize
// ============================================================================

/// Source rectangle in pixel coordinates, edges may be fractional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl CropBox {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Bilinear resample of `crop` (fractional edges allowed) to `size` x `size`.
/// When shrinking, the filter support widens with the scale factor so every
/// source pixel in the box contributes.
fn resize_crop(img: RgbImage, crop: CropBox, size: u32) -> Result<RgbImage> {
    let (width, height) = img.dimensions();
    let src = FirImage::from_vec_u8(width, height, img.into_raw(), PixelType::U8x3)
        .map_err(|e| anyhow!("Failed to wrap {}x{} image for resizing: {}", width, height, e))?;
    let mut dst = FirImage::new(size, size, PixelType::U8x3);

    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Bilinear))
        .crop(crop.left, crop.top, crop.width(), crop.height());
    Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| {
            anyhow!(
                "Failed to resize {:?} of a {}x{} image to {}x{}: {}",
                crop,
                width,
                height,
                size,
                size,
                e
            )
        })?;

    RgbImage::from_raw(size, size, dst.into_vec())
        .ok_or_else(|| anyhow!("Resized buffer does not match {}x{}", size, size))
}

/// Center crop plus bilinear resize to a fixed square, in one resampling pass.
///
/// The image is conceptually rescaled so its short side equals `resize_base`,
/// then the central `size` x `size` window is taken. Instead of doing that in
/// two lossy steps, the equivalent window is computed in source coordinates:
///
/// ```text
/// rescale = min(width, height) / resize_base
/// side    = size * rescale
/// box     = centered side x side square (fractional edges allowed)
/// ```
///
/// and resampled straight to `size` x `size`.
///
/// # Example
/// ```ignore
/// let crop = CenterCropResize::new(224, 256)?;
/// let out = crop.apply(rgb)?; // always 224x224
/// ```
#[derive(Debug, Clone)]
pub struct CenterCropResize {
    size: u32,
    resize_base: u32,
}

impl CenterCropResize {
    pub fn new(size: u32, resize_base: u32) -> Result<Self> {
        ensure!(size > 0, "Output size must be positive (got {})", size);
        ensure!(
            resize_base >= size,
            "resize_base ({}) must be at least the output size ({})",
            resize_base,
            size
        );
        Ok(Self { size, resize_base })
    }

    /// ImageNet evaluation geometry: 224 crop out of a 256 short side.
    pub fn imagenet() -> Self {
        Self {
            size: 224,
            resize_base: 256,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Source window sampled for a `width` x `height` image.
    pub fn crop_box(&self, width: u32, height: u32) -> CropBox {
        let rescale = width.min(height) as f64 / self.resize_base as f64;
        let side = self.size as f64 * rescale;
        let left = (width as f64 - side) / 2.0;
        let top = (height as f64 - side) / 2.0;
        CropBox {
            left,
            top,
            right: left + side,
            bottom: top + side,
        }
    }
}

impl Transform<RgbImage, RgbImage> for CenterCropResize {
    fn apply(&self, img: RgbImage) -> Result<RgbImage> {
        let (width, height) = img.dimensions();
        ensure!(
            width > 0 && height > 0,
            "Cannot crop an empty image ({}x{})",
            width,
            height
        );
        let crop = self.crop_box(width, height);
        resize_crop(img, crop, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba, RgbaImage};

    fn test_gradient_image(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width) as u8;
                let g = (y * 255 / height) as u8;
                img.put_pixel(x, y, Rgb([r, g, 128]));
            }
        }
        img
    }

    #[test]
    fn test_ensure_rgb_converts_other_layouts() -> Result<()> {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 3, Luma([77])));
        let rgb = EnsureRGB.apply(gray)?;
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([77, 77, 77]));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        let rgb = EnsureRGB.apply(rgba)?;
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([1, 2, 3]));
        Ok(())
    }

    #[test]
    fn test_crop_box_landscape() {
        let crop = CenterCropResize::imagenet().crop_box(512, 256);
        // short side 256 -> rescale 1.0 -> 224 px window centered
        assert_eq!(crop.left, 144.0);
        assert_eq!(crop.top, 16.0);
        assert_eq!(crop.width(), 224.0);
        assert_eq!(crop.height(), 224.0);
    }

    #[test]
    fn test_crop_box_fractional() {
        let crop = CenterCropResize::imagenet().crop_box(500, 375);
        let side = 224.0 * 375.0 / 256.0;
        assert!((crop.width() - side).abs() < 1e-9);
        assert!((crop.left - (500.0 - side) / 2.0).abs() < 1e-9);
        assert!((crop.top - (375.0 - side) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_output_is_fixed_size() -> Result<()> {
        let crop = CenterCropResize::imagenet();
        for (w, h) in [(500, 375), (224, 224), (100, 900), (1024, 768), (3, 5)] {
            let out = crop.apply(test_gradient_image(w, h))?;
            assert_eq!(out.dimensions(), (224, 224), "input {}x{}", w, h);
        }
        Ok(())
    }

    #[test]
    fn test_center_crop_keeps_center_color() -> Result<()> {
        // Red border outside the crop window, blue inside.
        let mut img = RgbImage::from_pixel(300, 200, Rgb([255, 0, 0]));
        let window = CenterCropResize::new(64, 80)?.crop_box(300, 200);
        for y in (window.top.floor() as u32 - 2)..(window.bottom.ceil() as u32 + 2) {
            for x in (window.left.floor() as u32 - 2)..(window.right.ceil() as u32 + 2) {
                img.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        let out = CenterCropResize::new(64, 80)?.apply(img)?;
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 255])));
        Ok(())
    }

    #[test]
    fn test_uniform_image_stays_uniform() -> Result<()> {
        let img = RgbImage::from_pixel(97, 61, Rgb([200, 17, 90]));
        let out = CenterCropResize::new(24, 40)?.apply(img)?;
        assert_eq!(out.dimensions(), (24, 24));
        assert!(out.pixels().all(|p| *p == Rgb([200, 17, 90])));
        Ok(())
    }

    #[test]
    fn test_full_window_at_native_size_is_lossless() -> Result<()> {
        // size == resize_base == short side: the window is the whole image
        let mut img = RgbImage::new(8, 8);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 30) as u8, (y * 30) as u8, ((x + y) * 10) as u8]);
        }
        let crop = CenterCropResize::new(8, 8)?;
        assert_eq!(crop.crop_box(8, 8).width(), 8.0);
        assert_eq!(crop.apply(img.clone())?, img);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_geometry() {
        assert!(CenterCropResize::new(0, 256).is_err());
        assert!(CenterCropResize::new(224, 200).is_err());
    }
}
