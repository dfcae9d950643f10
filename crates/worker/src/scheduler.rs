//! Bounded job queue and worker pool for size recomputation.
//!
//! Producers call [`SizeScheduler::request_size_update`] after a repository's
//! head advances. The call returns once the job is queued; when the queue is
//! full it waits for space. A fixed pool of workers takes jobs off the queue
//! and runs the handler under the repository's exclusion lock.
//!
//! A repository already waiting in the queue is not queued again. The waiting
//! job reads the live head when it runs, so it covers the later request too.

use crate::error::{ComputationError, JobFailure, SchedulerError};
use crate::locks::RepoLocks;
use async_trait::async_trait;
use dashmap::DashSet;
use futures::FutureExt;
use reposize_core::RepoId;
use reposize_core::config::SchedulerConfig;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Work run for each dequeued repository.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, repo_id: RepoId) -> Result<(), ComputationError>;
}

/// A queued recomputation request.
#[derive(Clone, Copy, Debug)]
pub struct Job {
    pub repo_id: RepoId,
    pub enqueued_at: Instant,
}

impl Job {
    pub fn new(repo_id: RepoId) -> Self {
        Self {
            repo_id,
            enqueued_at: Instant::now(),
        }
    }
}

/// Scheduler sizing.
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            job_timeout: config.job_timeout(),
        }
    }
}

/// Counters of finished jobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

struct Shared {
    handler: Arc<dyn JobHandler>,
    locks: RepoLocks,
    queued: DashSet<RepoId>,
    job_timeout: Option<Duration>,
    counters: Counters,
}

/// Size recomputation scheduler.
///
/// Construct once and share by reference (or `Arc`) with every producer.
pub struct SizeScheduler {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SizeScheduler {
    /// Spawn the worker pool. Must be called within a Tokio runtime.
    pub fn start(handler: Arc<dyn JobHandler>, options: SchedulerOptions) -> Self {
        let workers = options.workers.max(1);
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            handler,
            locks: RepoLocks::new(),
            queued: DashSet::new(),
            job_timeout: options.job_timeout,
            counters: Counters::default(),
        });

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    shared.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = workers,
            queue_capacity = options.queue_capacity,
            job_timeout = ?options.job_timeout,
            "Size scheduler started"
        );

        Self {
            tx,
            shared,
            shutdown,
            workers: Mutex::new(handles),
        }
    }

    /// Queue a recomputation of `repo_id`, waiting for space if the queue is full.
    ///
    /// Returns immediately if the repository is already queued.
    pub async fn request_size_update(&self, repo_id: RepoId) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if !self.shared.queued.insert(repo_id) {
            tracing::debug!(repo_id = %repo_id, "Size update already queued");
            return Ok(());
        }

        let sent = tokio::select! {
            _ = self.shutdown.cancelled() => false,
            result = self.tx.send(Job::new(repo_id)) => result.is_ok(),
        };
        if !sent {
            self.shared.queued.remove(&repo_id);
            return Err(SchedulerError::ShutDown);
        }

        tracing::debug!(repo_id = %repo_id, "Size update queued");
        Ok(())
    }

    /// Queue a recomputation without waiting. Fails with `QueueFull` instead of blocking.
    pub fn try_request_size_update(&self, repo_id: RepoId) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if !self.shared.queued.insert(repo_id) {
            return Ok(());
        }

        match self.tx.try_send(Job::new(repo_id)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.queued.remove(&repo_id);
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(SchedulerError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(SchedulerError::ShutDown),
                }
            }
        }
    }

    /// Repositories waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queued.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
        }
    }

    /// Token cancelled when the scheduler shuts down. Background loops feeding
    /// the scheduler stop on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop taking jobs, let in-flight jobs finish and join the workers.
    ///
    /// Jobs still queued are discarded. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Size worker ended abnormally");
            }
        }

        let discarded = self.shared.queued.len();
        self.shared.queued.clear();
        tracing::info!(discarded = discarded, "Size scheduler stopped");
    }
}

impl Drop for SizeScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    tracing::debug!(worker_id = worker_id, "Size worker started");

    loop {
        let job = {
            let mut queue = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                queue = rx.lock() => queue,
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            }
        };

        shared.queued.remove(&job.repo_id);
        run_job(worker_id, job, &shared).await;
    }

    tracing::debug!(worker_id = worker_id, "Size worker stopped");
}

async fn run_job(worker_id: usize, job: Job, shared: &Shared) {
    let _guard = shared.locks.lock(job.repo_id).await;
    let started = Instant::now();
    let waited = started.duration_since(job.enqueued_at);

    let work = AssertUnwindSafe(shared.handler.handle(job.repo_id)).catch_unwind();
    let result = match shared.job_timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(caught) => settle(caught),
            Err(_) => Err(JobFailure::TimedOut(limit)),
        },
        None => settle(work.await),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let counters = &shared.counters;
    match result {
        Ok(()) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                worker_id = worker_id,
                repo_id = %job.repo_id,
                waited_ms = waited.as_millis() as u64,
                elapsed_ms = elapsed_ms,
                "Size job completed"
            );
        }
        Err(failure) => {
            if matches!(failure, JobFailure::TimedOut(_)) {
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                worker_id = worker_id,
                repo_id = %job.repo_id,
                elapsed_ms = elapsed_ms,
                error = %failure,
                "Size job failed"
            );
        }
    }
}

fn settle(caught: std::thread::Result<Result<(), ComputationError>>) -> Result<(), JobFailure> {
    match caught {
        Ok(result) => result.map_err(JobFailure::from),
        Err(_) => Err(JobFailure::Panicked),
    }
}
