//! Worker pool for checking products concurrently.
//!
//! Workers share one bounded job queue and one result queue. Each worker runs
//! as an independent task, takes the next job whenever it is idle, runs the
//! comparator under a per-job timeout and sends exactly one outcome back.
//!
//! # Failure handling
//!
//! - Store failures are fatal: the worker reports the outcome, raises the
//!   shared abort flag and stops. Other workers stop taking jobs once they
//!   see the flag.
//! - Storefront/pricing failures and timeouts follow [`FetchFailurePolicy`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{CheckError, Comparator, Problem};

use super::job::{Job, JobOutcome};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker task panicked or was cancelled.
    #[error("Worker {worker_id} panicked: {message}")]
    WorkerPanicked { worker_id: String, message: String },
}

/// What a recoverable fetch failure does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Classify the product as `FetchFailed` and keep going.
    #[default]
    Isolate,
    /// Treat it like a store failure and abort the run.
    Abort,
}

impl std::str::FromStr for FetchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown fetch failure policy '{other}'")),
        }
    }
}

impl std::fmt::Display for FetchFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolate => write!(f, "isolate"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Maximum time allowed for checking a single product.
    pub job_timeout: Duration,
    /// Handling of storefront/pricing failures and timeouts.
    pub fetch_failures: FetchFailurePolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            job_timeout: Duration::from_secs(120),
            fetch_failures: FetchFailurePolicy::Isolate,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Sets the fetch failure policy.
    pub fn with_fetch_failures(mut self, policy: FetchFailurePolicy) -> Self {
        self.fetch_failures = policy;
        self
    }
}

/// Statistics about a finished worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Jobs that ended in a regular classification.
    pub jobs_completed: u64,
    /// Jobs that ended in a fetch failure, timeout or fatal error.
    pub jobs_failed: u64,
    /// Average job processing duration in milliseconds.
    pub average_job_ms: u64,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_job_ms = if total_jobs > 0 {
            total_duration_ms / total_jobs
        } else {
            0
        };

        PoolStats {
            num_workers,
            jobs_completed: completed,
            jobs_failed: failed,
            average_job_ms,
        }
    }
}

/// A running set of workers.
///
/// The pool does not keep its own handle on either queue: it finishes once
/// the job queue's sender is dropped and drained, and the result queue closes
/// once every worker has exited.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    worker_handles: Vec<(String, JoinHandle<()>)>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Spawns `config.num_workers` workers on the current runtime.
    pub fn start(
        config: WorkerPoolConfig,
        comparator: Arc<Comparator>,
        jobs: mpsc::Receiver<Job>,
        results: mpsc::Sender<JobOutcome>,
        abort: Arc<AtomicBool>,
    ) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));
        let stats = Arc::new(SharedPoolStats::new());
        let mut worker_handles = Vec::with_capacity(config.num_workers);

        for i in 0..config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                jobs: Arc::clone(&jobs),
                results: results.clone(),
                comparator: Arc::clone(&comparator),
                abort: Arc::clone(&abort),
                job_timeout: config.job_timeout,
                fetch_failures: config.fetch_failures,
                stats: Arc::clone(&stats),
            };
            let id = worker.id.clone();
            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            worker_handles.push((id, handle));
        }

        info!(
            num_workers = config.num_workers,
            job_timeout_secs = config.job_timeout.as_secs(),
            fetch_failures = %config.fetch_failures,
            "Worker pool started"
        );

        Self {
            config,
            worker_handles,
            stats,
        }
    }

    /// Waits for every worker to exit.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::WorkerPanicked` for the first worker that did not
    /// exit cleanly. The remaining workers are still awaited.
    pub async fn join(self) -> Result<PoolStats, PoolError> {
        let mut first_error = None;
        for (worker_id, handle) in self.worker_handles {
            if let Err(e) = handle.await {
                error!(worker_id = %worker_id, error = %e, "Worker task panicked");
                first_error.get_or_insert(PoolError::WorkerPanicked {
                    worker_id,
                    message: e.to_string(),
                });
            }
        }

        let stats = self.stats.to_pool_stats(self.config.num_workers);
        info!(
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            average_ms = stats.average_job_ms,
            "Worker pool finished"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

/// A single worker that checks products from the shared queue.
struct Worker {
    id: String,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobOutcome>,
    comparator: Arc<Comparator>,
    abort: Arc<AtomicBool>,
    job_timeout: Duration,
    fetch_failures: FetchFailurePolicy,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    /// Main worker loop. Runs until the job queue is drained or the run aborts.
    async fn run(self) {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            if self.abort.load(Ordering::SeqCst) {
                info!(worker_id = %self.id, "Worker stopping, run aborted");
                break;
            }

            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(job) = job else {
                break;
            };
            if self.abort.load(Ordering::SeqCst) {
                debug!(worker_id = %self.id, product_id = job.id, "Dropping job, run aborted");
                break;
            }

            let outcome = self.process_job(job).await;
            let fatal = outcome.is_fatal();

            if self.results.send(outcome).await.is_err() {
                warn!(worker_id = %self.id, "Result queue closed, worker stopping");
                break;
            }
            if fatal {
                self.abort.store(true, Ordering::SeqCst);
                break;
            }
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }

    /// Checks one product and applies the failure policy.
    async fn process_job(&self, job: Job) -> JobOutcome {
        let start_time = Instant::now();

        let checked = match tokio::time::timeout(self.job_timeout, self.comparator.check(&job)).await
        {
            Ok(result) => result,
            Err(_) => Err(CheckError::Timeout(self.job_timeout)),
        };

        let duration = start_time.elapsed();

        let result = match checked {
            Ok(problem) => {
                self.stats.record_completion(duration);
                Ok(problem)
            }
            Err(e) if e.is_fatal() || self.fetch_failures == FetchFailurePolicy::Abort => {
                self.stats.record_failure(duration);
                error!(
                    worker_id = %self.id,
                    product_id = job.id,
                    model_number = %job.model_number,
                    error = %e,
                    "Check failed, aborting run"
                );
                Err(e)
            }
            Err(e) => {
                self.stats.record_failure(duration);
                warn!(
                    worker_id = %self.id,
                    product_id = job.id,
                    model_number = %job.model_number,
                    error = %e,
                    "Check failed, product classified as fetch failure"
                );
                Ok(Problem::FetchFailed {
                    reason: e.to_string(),
                })
            }
        };

        JobOutcome {
            job,
            worker_id: self.id.clone(),
            result,
            duration,
        }
    }
}
