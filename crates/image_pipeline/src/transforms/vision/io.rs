use crate::transforms::Transform;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

// ============================================================================
// LoadImage - Base image loader
// ============================================================================

/// Reads and decodes an image file.
///
/// The whole file is read through a buffered reader first and the format is
/// sniffed from its bytes, so mislabeled extensions still decode.
///
/// # Input/Output
/// - **Input**: `PathBuf` - File path to image
/// - **Output**: `DynamicImage` - Decoded image in whatever layout the file had
#[derive(Debug, Clone)]
pub struct LoadImage {
    buffer_size: usize,
}

impl Default for LoadImage {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadImage {
    /// Creates a new image loader with an 8KB read buffer.
    pub fn new() -> Self {
        Self { buffer_size: 8192 }
    }
}

impl Transform<PathBuf, DynamicImage> for LoadImage {
    fn apply(&self, path: PathBuf) -> Result<DynamicImage> {
        let file = File::open(&path)
            .with_context(|| format!("Failed to open image: {}", path.display()))?;

        let file_size = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = Vec::with_capacity(file_size);
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;

        ImageReader::new(Cursor::new(buffer))
            .with_guessed_format()
            .with_context(|| format!("Failed to detect image format: {}", path.display()))?
            .decode()
            .with_context(|| format!("Failed to decode image: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_image() -> Result<NamedTempFile> {
        let mut test_img = RgbImage::new(3, 3);
        test_img.put_pixel(0, 0, Rgb([255, 0, 0]));
        test_img.put_pixel(1, 1, Rgb([0, 255, 0]));
        test_img.put_pixel(2, 2, Rgb([0, 0, 255]));

        let temp_file = NamedTempFile::with_suffix(".png")?;
        test_img.save(temp_file.path())?;
        Ok(temp_file)
    }

    #[test]
    fn test_load_image() -> Result<()> {
        let temp_file = create_test_image()?;
        let loaded_image = LoadImage::new().apply(temp_file.path().to_path_buf())?;

        assert_eq!(loaded_image.dimensions(), (3, 3));
        let rgb = loaded_image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([0, 255, 0]));
        assert_eq!(rgb.get_pixel(2, 2), &Rgb([0, 0, 255]));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = LoadImage::new().apply(PathBuf::from("nonexistent.jpg"));
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("nonexistent.jpg"), "error should name the file: {}", msg);
    }

    #[test]
    fn test_corrupt_file_is_an_error() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".jpg")?;
        file.write_all(b"definitely not a jpeg")?;
        assert!(LoadImage::new().apply(file.path().to_path_buf()).is_err());
        Ok(())
    }
}
