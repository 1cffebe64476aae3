#![allow(dead_code)]

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use image_pipeline::{CategoryMap, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SEED: u64 = 42;
pub const CLASSES: usize = 3;

/// `n` paths of the form `class{i % 3}/{i}.png`. Nothing exists on disk.
pub fn fake_files(n: usize) -> (Vec<PathBuf>, CategoryMap) {
    let files = (0..n)
        .map(|i| PathBuf::from(format!("class{}/{}.png", i % CLASSES, i)))
        .collect();
    let categories = CategoryMap::from_names((0..CLASSES).map(|c| format!("class{}", c)));
    (files, categories)
}

pub fn stem_index(path: &Path) -> Result<usize> {
    Ok(path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("no file stem in {}", path.display()))?
        .parse()?)
}

/// Colour every image of sample `i` is filled with.
pub fn expected_pixel(i: usize) -> [u8; 3] {
    [(i % 256) as u8, (i / 256 % 256) as u8, 7]
}

/// Fake decoder: a solid `size` x `size` image whose colour encodes the index.
pub fn stem_image(size: u32) -> impl Fn(PathBuf) -> Result<RgbImage> + Send + Sync + 'static {
    move |path: PathBuf| {
        let index = stem_index(&path)?;
        Ok(RgbImage::from_pixel(size, size, Rgb(expected_pixel(index))))
    }
}

/// Fake decoder that fails on every index in `bad`.
pub fn failing_image(
    size: u32,
    bad: Vec<usize>,
) -> impl Fn(PathBuf) -> Result<RgbImage> + Send + Sync + 'static {
    let inner = stem_image(size);
    move |path: PathBuf| {
        let index = stem_index(&path)?;
        if bad.contains(&index) {
            return Err(anyhow!("corrupt image {}", path.display()));
        }
        inner(path)
    }
}

/// Fake decoder that sleeps `delay` for every index below `slow_below` and
/// tracks how many decodes run at once.
pub struct SlowImage {
    pub size: u32,
    pub delay: Duration,
    pub slow_below: usize,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl SlowImage {
    pub fn new(size: u32, delay: Duration, slow_below: usize) -> Self {
        Self {
            size,
            delay,
            slow_below,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl image_pipeline::transforms::Transform<PathBuf, RgbImage> for SlowImage {
    fn apply(&self, path: PathBuf) -> Result<RgbImage> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let index = stem_index(&path)?;
        if index < self.slow_below {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(RgbImage::from_pixel(self.size, self.size, Rgb(expected_pixel(index))))
    }
}

/// Sequential, 4x4-image config.
pub fn small_config(batch_size: usize, batch_count: usize, num_workers: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .batch_size(batch_size)
        .batch_count(batch_count)
        .num_workers(num_workers)
        .shuffle(false)
        .image_geometry(4, 4)
        .build()
}
