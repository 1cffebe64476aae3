//! image-pipeline
//!
//! Drains an image folder (`<root>/<category>/<image>`) through the batch
//! loader once and reports throughput.
//!
//! ```bash
//! image-pipeline /data/imagenet/val --batch-size 64 --batch-count 32 -v
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use image_pipeline::{BatchLoader, DecodeErrorPolicy, ImageFolder, PipelineConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Shuffled, batch-aligned image loading benchmark
#[derive(Parser)]
#[command(name = "image-pipeline")]
#[command(version)]
#[command(about = "Loads every image of a folder in shuffled batches and reports images/second")]
struct Cli {
    /// Dataset root with one sub-directory per category
    root: PathBuf,

    /// Samples per batch
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Batches in flight
    #[arg(long, default_value_t = 32)]
    batch_count: usize,

    /// Decode worker threads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Visit files in directory order instead of shuffling
    #[arg(long)]
    no_shuffle: bool,

    /// Shuffle seed
    #[arg(long)]
    seed: Option<u64>,

    /// Epoch mixed into the shuffle seed
    #[arg(long, default_value_t = 0)]
    epoch: usize,

    /// Output side length
    #[arg(long, default_value_t = 224)]
    image_size: u32,

    /// Short side the image is rescaled to before the center crop
    #[arg(long, default_value_t = 256)]
    resize_base: u32,

    /// Replace unreadable images instead of stopping
    #[arg(long)]
    skip_bad_images: bool,

    /// Fail if no sample completes within this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log progress every N batches
    #[arg(long, default_value_t = 20)]
    log_every: usize,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    root: PathBuf,
    files: usize,
    categories: usize,
    batches: usize,
    images: usize,
    skipped: usize,
    workers: usize,
    elapsed_secs: f64,
    images_per_sec: f64,
}

fn build_config(cli: &Cli) -> PipelineConfig {
    let mut builder = PipelineConfig::builder()
        .batch_size(cli.batch_size)
        .batch_count(cli.batch_count)
        .shuffle(!cli.no_shuffle)
        .epoch(cli.epoch)
        .image_geometry(cli.image_size, cli.resize_base);
    if let Some(workers) = cli.workers {
        builder = builder.num_workers(workers);
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if cli.skip_bad_images {
        builder = builder.decode_error_policy(DecodeErrorPolicy::Skip);
    }
    if let Some(secs) = cli.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let folder = ImageFolder::scan(&cli.root)
        .with_context(|| format!("Failed to scan {}", cli.root.display()))?;
    info!(
        files = folder.len(),
        categories = folder.categories().len(),
        "scanned dataset"
    );

    let config = build_config(cli);
    let workers = config.num_workers;
    let mut loader = BatchLoader::from_folder(&folder, config)?;

    let start = Instant::now();
    let mut batches = 0;
    let mut images = 0;
    for batch in loader.by_ref() {
        let batch = batch?;
        batches += 1;
        images += batch.len();
        if cli.log_every > 0 && batches % cli.log_every == 0 {
            let secs = start.elapsed().as_secs_f64();
            info!(
                batches,
                images,
                images_per_sec = format!("{:.1}", images as f64 / secs),
                "progress"
            );
        }
    }
    let elapsed = start.elapsed().as_secs_f64();
    let skipped = loader.skipped_samples();
    let report = loader.shutdown();
    info!(?report, "workers stopped");

    Ok(RunSummary {
        root: cli.root.clone(),
        files: folder.len(),
        categories: folder.categories().len(),
        batches,
        images,
        skipped,
        workers,
        elapsed_secs: elapsed,
        images_per_sec: if elapsed > 0.0 { images as f64 / elapsed } else { 0.0 },
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let summary = run(&cli)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} images in {} batches ({} skipped) in {:.2}s with {} workers: {:.1} images/sec",
            summary.images,
            summary.batches,
            summary.skipped,
            summary.elapsed_secs,
            summary.workers,
            summary.images_per_sec
        );
    }
    Ok(())
}
