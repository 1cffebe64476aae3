//! Worker pool for parallel sample decoding.
//!
//! Manages worker lifecycle, task distribution and result collection:
//! - Work queue: coordinator -> workers, one shared unbounded MPMC channel
//! - Completion queue: workers -> coordinator, unbounded
//!
//! Sending never blocks. The coordinator never has more than
//! `batch_size * batch_count` tasks outstanding because every task carries an
//! arena slot, so the arena bounds both queues.
//!
//! # Shutdown
//! [`WorkerPool::stop`] drops every task still waiting in the work queue,
//! sends one sentinel per worker and closes the queue, so each worker exits
//! once its current task returns. [`WorkerPool::join`] then waits for them;
//! [`WorkerPool::join_finished`] only reaps the ones that already exited and
//! detaches the rest (a worker stuck in a decode). Dropping the pool without
//! stopping it closes the work queue instead and joins every worker.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::dataloader::common::thread::WORKER_ID;

/// Outcome of a pool shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Sentinels placed on the work queue (one per worker).
    pub sentinels_sent: usize,
    /// Workers that exited normally and were joined.
    pub workers_joined: usize,
    /// Workers whose thread panicked.
    pub workers_panicked: usize,
    /// Workers still busy at shutdown and left to exit on their own.
    pub workers_detached: usize,
}

/// Fixed-size pool of named worker threads sharing one work queue.
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    task_rx: Receiver<Task>,
    output_rx: Receiver<Output>,
    sentinels_sent: usize,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`.
    ///
    /// Every worker gets a clone of the work receiver and the completion
    /// sender; the pool keeps no completion sender of its own, so the
    /// completion queue disconnects once every worker has exited.
    pub(crate) fn new<F>(num_workers: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. Set num_workers > 0."
            ));
        }

        let (task_tx, task_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let worker_fn = std::sync::Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("pipeline-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| id.set(worker_id));
                    worker_fn(task_rx, output_tx);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            workers.push(handle);
        }
        debug!(num_workers, "worker pool started");

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            task_rx,
            output_rx,
            sentinels_sent: 0,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task. Never blocks.
    pub(crate) fn send(&self, task: Task) -> Result<()> {
        let tx = self
            .task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("Worker pool is shut down"))?;
        tx.send(task)
            .map_err(|_| anyhow!("Work queue disconnected - all workers have exited"))
    }

    /// Blocks for the next completion, or up to `timeout` when set.
    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Result<Output> {
        match timeout {
            None => self
                .output_rx
                .recv()
                .map_err(|_| anyhow!("Worker channel disconnected - workers may have crashed")),
            Some(timeout) => self.output_rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => anyhow!(
                    "Worker timeout after {:?} - possible deadlock or slow data loading",
                    timeout
                ),
                RecvTimeoutError::Disconnected => {
                    anyhow!("Worker channel disconnected - workers may have crashed")
                }
            }),
        }
    }

    /// Drops queued tasks, sends one `sentinel()` per worker and closes the
    /// work queue. Does not wait. Idempotent.
    pub(crate) fn stop(&mut self, sentinel: impl Fn() -> Task) {
        let Some(task_tx) = self.task_tx.take() else {
            return;
        };
        let discarded = self.task_rx.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "dropped queued tasks");
        }
        for _ in 0..self.workers.len() {
            if task_tx.send(sentinel()).is_ok() {
                self.sentinels_sent += 1;
            }
        }
    }

    /// Waits for every worker thread to exit.
    pub(crate) fn join(&mut self) -> ShutdownReport {
        let mut report = self.base_report();
        for (worker_id, worker) in self.workers.drain(..).enumerate() {
            Self::reap(worker_id, worker, &mut report);
        }
        debug!(?report, "worker pool shut down");
        report
    }

    /// Joins workers that already exited and detaches the ones still running.
    pub(crate) fn join_finished(&mut self) -> ShutdownReport {
        let mut report = self.base_report();
        for (worker_id, worker) in self.workers.drain(..).enumerate() {
            if worker.is_finished() {
                Self::reap(worker_id, worker, &mut report);
            } else {
                warn!(worker_id, "worker still busy, detaching");
                report.workers_detached += 1;
            }
        }
        debug!(?report, "worker pool shut down");
        report
    }

    /// [`stop`](Self::stop) followed by [`join`](Self::join).
    pub(crate) fn shutdown(&mut self, sentinel: impl Fn() -> Task) -> ShutdownReport {
        self.stop(sentinel);
        self.join()
    }

    fn base_report(&mut self) -> ShutdownReport {
        ShutdownReport {
            sentinels_sent: std::mem::take(&mut self.sentinels_sent),
            ..ShutdownReport::default()
        }
    }

    fn reap(worker_id: usize, worker: thread::JoinHandle<()>, report: &mut ShutdownReport) {
        match worker.join() {
            Ok(()) => report.workers_joined += 1,
            Err(_) => {
                warn!(worker_id, "worker thread panicked");
                report.workers_panicked += 1;
            }
        }
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Closing the work queue ends every worker once it drains
        self.task_tx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
