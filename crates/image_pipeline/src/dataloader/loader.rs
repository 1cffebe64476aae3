//! src/dataloader/loader.rs
//!
//! The batch coordinator.
//!
//! `BatchLoader` owns the sample arena, the worker pool and the source order.
//! Each of its `batch_count` batches cycles through
//!
//! ```text
//!   Filling ──(C completions)──▶ HandedOut ──(Batch dropped)──▶ Filling
//!      │
//!      └──(source exhausted before the batch got any work)──▶ Idle
//! ```
//!
//! The thread iterating the loader is the only one touching completion
//! counters and the only one enqueueing work; workers only write the slot
//! buffers they were handed.
//!
//! # Example
//! ```ignore
//! let folder = ImageFolder::scan("/data/imagenet/val")?;
//! let config = PipelineConfig::builder().batch_size(64).seed(42).build();
//! let mut loader = BatchLoader::from_folder(&folder, config)?;
//!
//! for batch in loader.by_ref() {
//!     let batch = batch?;
//!     train_step(batch.to_contiguous(), batch.labels())?;
//!     // `batch` dropped here -> its slots are refilled
//! }
//! let report = loader.shutdown();
//! ```

use anyhow::{anyhow, bail, ensure, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::arena::SampleArena;
use super::batch::{Batch, ReleasedBatch};
use super::config::{DecodeErrorPolicy, PipelineConfig};
use super::workers::pool::{ShutdownReport, WorkerPool};
use super::workers::{run_worker, WorkerOutput, WorkerTask};
use crate::readers::{CategoryMap, ImageFolder};
use crate::sampler::{Sampler, SequentialSampler, ShuffleSampler};
use crate::transforms::vision::decode_pipeline;
use crate::transforms::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    /// Work queued, waiting for completions.
    Filling,
    /// Owned by the caller.
    HandedOut,
    /// Nothing queued, the source ran dry.
    Idle,
}

#[derive(Debug)]
struct BatchState {
    phase: BatchPhase,
    completed: usize,
    seen: Vec<bool>,
}

impl BatchState {
    fn new(batch_size: usize) -> Self {
        Self {
            phase: BatchPhase::Idle,
            completed: 0,
            seen: vec![false; batch_size],
        }
    }

    fn reset(&mut self) {
        self.completed = 0;
        self.seen.iter_mut().for_each(|s| *s = false);
    }
}

/// Shuffled, batch-aligned image loader.
///
/// Iterating yields `floor(N / batch_size)` batches (fewer if samples are
/// skipped), in completion order. Trailing samples that do not fill a batch
/// are dropped. After the last batch the workers are shut down. After an
/// error the iterator is fused and the workers are told to stop, but they
/// are only joined by [`shutdown`](Self::shutdown) or `Drop`, so a stuck
/// decoder cannot hold back the error. Queued decodes are dropped on every
/// shutdown; only the ones already running are waited for.
pub struct BatchLoader {
    config: PipelineConfig,
    files: Arc<[PathBuf]>,
    categories: CategoryMap,
    source: Box<dyn Iterator<Item = usize> + Send>,
    source_exhausted: bool,

    arena: SampleArena,
    batches: Vec<BatchState>,
    slot_labels: Vec<usize>,
    slot_sources: Vec<usize>,

    pool: WorkerPool<WorkerTask, WorkerOutput>,
    release_tx: Sender<ReleasedBatch>,
    release_rx: Receiver<ReleasedBatch>,

    in_flight: usize,
    remaining: usize,
    skipped: usize,
    stalled: bool,
    finished: bool,
    report: Option<ShutdownReport>,
}

impl BatchLoader {
    /// Loader over `folder` with the standard decode pipeline.
    pub fn from_folder(folder: &ImageFolder, config: PipelineConfig) -> Result<Self> {
        Self::new(folder.files().to_vec(), folder.categories().clone(), config)
    }

    /// Loader over an explicit file list with the standard decode pipeline
    /// (`LoadImage -> EnsureRGB -> CenterCropResize`).
    pub fn new(files: Vec<PathBuf>, categories: CategoryMap, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let transform = decode_pipeline(config.image_size, config.resize_base)?;
        Self::with_transform(files, categories, config, transform)
    }

    /// Loader whose workers run `transform` on every path. The transform must
    /// produce `image_size` x `image_size` images.
    pub fn with_transform<T>(
        files: Vec<PathBuf>,
        categories: CategoryMap,
        config: PipelineConfig,
        transform: T,
    ) -> Result<Self>
    where
        T: Transform<PathBuf, RgbImage> + 'static,
    {
        config.validate()?;

        let sampler: Box<dyn Sampler> = if config.shuffle {
            let seed = config.seed.unwrap_or_else(|| rand::rng().random());
            debug!(seed, epoch = config.epoch, "shuffling source order");
            Box::new(ShuffleSampler::new(files.len(), seed))
        } else {
            Box::new(SequentialSampler::new(files.len()))
        };
        let source = sampler.iter(config.epoch);

        let transform = Arc::new(transform);
        let pool = WorkerPool::new(config.num_workers, move |task_rx, output_tx| {
            run_worker(transform.as_ref(), task_rx, output_tx)
        })
        .context("Failed to start sample workers")?;

        let (release_tx, release_rx) = unbounded();
        let slot_count = config.slot_count();
        let mut loader = Self {
            arena: SampleArena::new(slot_count, config.slot_len()),
            batches: (0..config.batch_count)
                .map(|_| BatchState::new(config.batch_size))
                .collect(),
            slot_labels: vec![0; slot_count],
            slot_sources: vec![0; slot_count],
            remaining: files.len() / config.batch_size,
            files: files.into(),
            categories,
            source,
            source_exhausted: false,
            pool,
            release_tx,
            release_rx,
            in_flight: 0,
            skipped: 0,
            stalled: false,
            finished: false,
            report: None,
            config,
        };

        info!(
            files = loader.files.len(),
            batches = loader.remaining,
            batch_size = loader.config.batch_size,
            batch_count = loader.config.batch_count,
            workers = loader.pool.num_workers(),
            "starting batch loader"
        );
        for num in 0..loader.config.batch_count {
            loader.enqueue_batch(num)?;
        }
        Ok(loader)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Batches still to be yielded (assuming no sample is skipped).
    pub fn remaining_batches(&self) -> usize {
        self.remaining
    }

    /// Batches with work queued or held by the caller. Never exceeds
    /// `batch_count`.
    pub fn outstanding_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.phase != BatchPhase::Idle)
            .count()
    }

    /// Samples replaced after decode failures under [`DecodeErrorPolicy::Skip`].
    pub fn skipped_samples(&self) -> usize {
        self.skipped
    }

    /// Shutdown outcome once the workers have been joined.
    pub fn report(&self) -> Option<ShutdownReport> {
        self.report
    }

    /// Stops the workers (one sentinel each) and waits for them to exit.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.finish()
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn next_source(&mut self) -> Option<usize> {
        if self.source_exhausted {
            return None;
        }
        let next = self.source.next();
        if next.is_none() {
            debug!("source exhausted");
            self.source_exhausted = true;
        }
        next
    }

    /// Queues the next source sample into `slot`. `Ok(false)` once the source
    /// is exhausted.
    fn enqueue_slot(&mut self, slot: usize) -> Result<bool> {
        let Some(source) = self.next_source() else {
            return Ok(false);
        };
        let path = self.files[source].clone();
        let label = self
            .categories
            .label_for(&path)
            .with_context(|| format!("Cannot label sample {}", source))?;
        self.slot_labels[slot] = label;
        self.slot_sources[slot] = source;

        let buffer = self.arena.take(slot)?;
        self.pool.send(WorkerTask::Load { slot, path, buffer })?;
        self.in_flight += 1;
        Ok(true)
    }

    /// Fills every slot of batch `num` from the source. Stops quietly when
    /// the source runs out.
    fn enqueue_batch(&mut self, num: usize) -> Result<()> {
        let batch_size = self.batch_size();
        self.batches[num].reset();

        let mut queued = 0;
        for slot in num * batch_size..(num + 1) * batch_size {
            if !self.enqueue_slot(slot)? {
                break;
            }
            queued += 1;
        }

        self.batches[num].phase = if queued == 0 {
            BatchPhase::Idle
        } else {
            BatchPhase::Filling
        };
        if 0 < queued && queued < batch_size {
            debug!(num, queued, "partial batch queued, it will never complete");
        }
        Ok(())
    }

    /// Takes back every batch the caller has dropped and refills it.
    fn drain_releases(&mut self) -> Result<()> {
        while let Ok(released) = self.release_rx.try_recv() {
            let num = released.num;
            ensure!(
                self.batches[num].phase == BatchPhase::HandedOut,
                "Batch {} released but it was not handed out",
                num
            );
            self.arena.put_range(num * self.batch_size(), released.buffers)?;
            self.enqueue_batch(num)?;
        }
        Ok(())
    }

    fn hand_out(&mut self, num: usize) -> Result<Batch> {
        let range = num * self.batch_size()..(num + 1) * self.batch_size();
        let buffers = self.arena.take_range(range.clone())?;
        let indices = self.slot_sources[range.clone()].to_vec();
        let paths = indices.iter().map(|&i| self.files[i].clone()).collect();

        let state = &mut self.batches[num];
        state.reset();
        state.phase = BatchPhase::HandedOut;

        Batch::new(
            num,
            self.config.image_size as usize,
            buffers,
            self.slot_labels[range].to_vec(),
            indices,
            paths,
            self.release_tx.clone(),
        )
    }

    /// Records one completed slot. Returns the batch number once it is full.
    fn complete_slot(&mut self, slot: usize) -> Result<Option<usize>> {
        let batch_size = self.batch_size();
        let num = slot / batch_size;
        let state = self
            .batches
            .get_mut(num)
            .ok_or_else(|| anyhow!("Completion for unknown slot {}", slot))?;
        ensure!(
            state.phase == BatchPhase::Filling,
            "Completion for slot {} of batch {} which is not filling",
            slot,
            num
        );
        let seen = &mut state.seen[slot % batch_size];
        ensure!(!*seen, "Duplicate completion for slot {}", slot);
        *seen = true;
        state.completed += 1;
        Ok((state.completed == batch_size).then_some(num))
    }

    /// Blocks until some batch is complete. `Ok(None)` when no batch can
    /// complete any more.
    fn receive_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            self.drain_releases()?;

            if self.in_flight == 0 {
                if self.source_exhausted {
                    return Ok(None);
                }
                bail!(
                    "All {} batches are held by the caller; drop a batch before requesting another",
                    self.config.batch_count
                );
            }

            let output = match self.pool.recv(self.config.timeout) {
                Ok(output) => output,
                Err(e) => {
                    self.stalled = true;
                    return Err(e);
                }
            };
            self.in_flight -= 1;

            match output {
                WorkerOutput::Loaded { slot, buffer } => {
                    self.arena.put(slot, buffer)?;
                    if let Some(num) = self.complete_slot(slot)? {
                        return self.hand_out(num).map(Some);
                    }
                }
                WorkerOutput::Failed {
                    slot,
                    path,
                    buffer,
                    error,
                } => {
                    self.arena.put(slot, buffer)?;
                    match self.config.decode_error_policy {
                        DecodeErrorPolicy::Halt => {
                            return Err(error.context(format!(
                                "Failed to load {} into slot {}",
                                path.display(),
                                slot
                            )));
                        }
                        DecodeErrorPolicy::Skip => {
                            warn!(
                                slot,
                                path = %path.display(),
                                error = %format!("{:#}", error),
                                "skipping unreadable image"
                            );
                            self.skipped += 1;
                            if !self.enqueue_slot(slot)? {
                                debug!(
                                    slot,
                                    "no replacement left, batch {} is abandoned",
                                    slot / self.batch_size()
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Fuses the iterator and stops the workers without waiting for them.
    fn abort(&mut self) {
        self.finished = true;
        self.pool.stop(|| WorkerTask::Shutdown);
    }

    fn finish(&mut self) -> ShutdownReport {
        if let Some(report) = self.report {
            return report;
        }
        self.finished = true;
        let report = if self.stalled {
            // A worker stuck in a decode would block the join forever.
            self.pool.stop(|| WorkerTask::Shutdown);
            self.pool.join_finished()
        } else {
            self.pool.shutdown(|| WorkerTask::Shutdown)
        };
        if report.workers_panicked > 0 {
            warn!(?report, "some workers panicked");
        }
        info!(skipped = self.skipped, ?report, "batch loader finished");
        self.report = Some(report);
        report
    }
}

impl Iterator for BatchLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == 0 {
            self.finish();
            return None;
        }

        match self.receive_batch() {
            Ok(Some(batch)) => {
                self.remaining -= 1;
                Some(Ok(batch))
            }
            Ok(None) => {
                debug!(
                    missing = self.remaining,
                    "source exhausted before every batch filled"
                );
                self.finish();
                None
            }
            Err(e) => {
                self.abort();
                Some(Err(e))
            }
        }
    }
}

impl Drop for BatchLoader {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn fake_files(n: usize) -> (Vec<PathBuf>, CategoryMap) {
        let files = (0..n)
            .map(|i| PathBuf::from(format!("class{}/{}.png", i % 3, i)))
            .collect();
        (files, CategoryMap::from_names(["class0", "class1", "class2"]))
    }

    fn stem_pixel(path: PathBuf) -> Result<RgbImage> {
        let index: u32 = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("bad path"))?
            .parse()?;
        Ok(RgbImage::from_pixel(4, 4, Rgb([(index % 251) as u8, 0, 0])))
    }

    fn small_config(batch_size: usize, batch_count: usize) -> PipelineConfig {
        PipelineConfig::builder()
            .batch_size(batch_size)
            .batch_count(batch_count)
            .num_workers(3)
            .shuffle(false)
            .image_geometry(4, 4)
            .build()
    }

    #[test]
    fn primes_every_batch() -> Result<()> {
        let (files, categories) = fake_files(100);
        let loader = BatchLoader::with_transform(files, categories, small_config(4, 5), stem_pixel)?;
        assert_eq!(loader.outstanding_batches(), 5);
        assert_eq!(loader.in_flight, 20);
        assert_eq!(loader.arena.available(), 0, "every slot is out with a worker");
        Ok(())
    }

    #[test]
    fn duplicate_completion_is_rejected() -> Result<()> {
        let (files, categories) = fake_files(8);
        let mut loader = BatchLoader::with_transform(files, categories, small_config(4, 2), stem_pixel)?;
        assert_eq!(loader.complete_slot(1)?, None);
        assert!(loader.complete_slot(1).is_err());
        Ok(())
    }

    #[test]
    fn unknown_category_fails_at_enqueue() {
        let files = vec![PathBuf::from("mystery/0.png")];
        let categories = CategoryMap::from_names(["known"]);
        let result = BatchLoader::with_transform(files, categories, small_config(1, 1), stem_pixel);
        let msg = format!("{:#}", result.err().unwrap());
        assert!(msg.contains("Unknown category 'mystery'"), "{}", msg);
    }

    #[test]
    fn empty_file_list_yields_nothing() -> Result<()> {
        let mut loader =
            BatchLoader::with_transform(Vec::new(), CategoryMap::default(), small_config(4, 2), stem_pixel)?;
        assert_eq!(loader.outstanding_batches(), 0);
        assert!(loader.next().is_none());
        let report = loader.report().unwrap();
        assert_eq!(report.sentinels_sent, 3);
        assert_eq!(report.workers_joined, 3);
        Ok(())
    }
}
