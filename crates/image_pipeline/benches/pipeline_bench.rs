use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use image_pipeline::sampler::ShuffledIndices;
use image_pipeline::transforms::vision::CenterCropResize;
use image_pipeline::transforms::Transform;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Benchmarks for the two CPU-bound stages outside of decoding.
///
/// This measures:
/// 1. Index shuffling: lazy sparse Fisher-Yates vs. shuffling a full `Vec`
/// 2. Center crop + bilinear resize of a typical ImageNet-sized image
///
/// To run these, use:
/// ```bash
/// cargo bench -p image_pipeline
/// ```

/// Shuffle sweeps dataset sizes up to ImageNet's train split.
const SIZES: [usize; 3] = [10_000, 100_000, 1_281_167];

/// Only the first batches of an epoch are drawn when measuring startup.
const FIRST_DRAWS: usize = 64 * 32;

fn bench_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Index Shuffle");

    for &size in &SIZES {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("sparse_full", size), &size, |b, &n| {
            b.iter(|| {
                let sum: usize = ShuffledIndices::new(n, StdRng::seed_from_u64(42)).sum();
                black_box(sum)
            })
        });

        group.bench_with_input(BenchmarkId::new("vec_full", size), &size, |b, &n| {
            b.iter(|| {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut StdRng::seed_from_u64(42));
                black_box(order.iter().sum::<usize>())
            })
        });

        group.bench_with_input(BenchmarkId::new("sparse_first_draws", size), &size, |b, &n| {
            b.iter(|| {
                let sum: usize = ShuffledIndices::new(n, StdRng::seed_from_u64(42))
                    .take(FIRST_DRAWS)
                    .sum();
                black_box(sum)
            })
        });
    }
    group.finish();
}

fn bench_center_crop(c: &mut Criterion) {
    let mut group = c.benchmark_group("Center Crop Resize");
    let mut img = RgbImage::new(500, 375);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8]);
    }

    for (size, base) in [(224, 256), (128, 146)] {
        let crop = CenterCropResize::new(size, base).unwrap();
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("500x375", size), &img, |b, img| {
            b.iter(|| black_box(crop.apply(img.clone()).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(5))
        .sample_size(30);
    targets = bench_shuffle, bench_center_crop
);
criterion_main!(benches);
