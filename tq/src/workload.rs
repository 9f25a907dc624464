//! Synthetic workloads for exercising the queues and retry from the CLI

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{ConcurrencyConfig, FrequencyConfig, RetryConfig};
use crate::queue::{ConcurrencyQueue, FrequencyQueue, QueueError, QueueStats};
use crate::retry::{RetryError, retry};

/// Failure produced by a simulated task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    #[error("task {0} failed")]
    TaskFailed(usize),
}

/// Shape of a batch of simulated tasks
#[derive(Debug, Clone)]
pub struct Workload {
    /// Number of tasks to add
    pub tasks: usize,

    /// Base time each task spends working
    pub work: Duration,

    /// Every n-th task fails (1-based); `None` means none fail
    pub fail_every: Option<usize>,
}

impl Workload {
    fn fails(&self, task: usize) -> bool {
        self.fail_every.is_some_and(|n| n > 0 && (task + 1) % n == 0)
    }
}

/// Outcome of running a workload through a queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub elapsed_ms: u128,
    pub succeeded: usize,
    pub failed: usize,
    pub stats: QueueStats,
}

/// Outcome of a simulated retry
#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub elapsed_ms: u128,
    pub invocations: u32,
    pub outcome: String,
}

/// Up to half of `work` again
fn jitter(work: Duration) -> Duration {
    if work.is_zero() {
        return Duration::ZERO;
    }
    work.mul_f64(rand::rng().random_range(0.0..0.5))
}

/// Sleep for roughly `work`, then succeed or fail as told
async fn simulate(task: usize, work: Duration, fail: bool) -> Result<usize, WorkloadError> {
    tokio::time::sleep(work + jitter(work)).await;

    if fail {
        debug!(task, "simulate: failing task");
        return Err(WorkloadError::TaskFailed(task));
    }
    Ok(task)
}

fn report(begin: Instant, results: Vec<Result<usize, WorkloadError>>, stats: QueueStats) -> QueueReport {
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    QueueReport {
        elapsed_ms: begin.elapsed().as_millis(),
        succeeded,
        failed: results.len() - succeeded,
        stats,
    }
}

/// Push the workload through a concurrency-bounded queue and wait for it to drain
pub async fn run_concurrency(config: &ConcurrencyConfig, workload: &Workload) -> Result<QueueReport, QueueError> {
    info!(concurrency = config.concurrency, tasks = workload.tasks, "run_concurrency: called");
    let work = workload.work;
    let queue = ConcurrencyQueue::from_config(config, move |(task, fail): (usize, bool)| simulate(task, work, fail))?;

    let begin = Instant::now();
    let tasks: Vec<_> = (0..workload.tasks)
        .map(|task| queue.add((task, workload.fails(task))))
        .collect();
    queue.start();

    let results = join_all(tasks).await;
    queue.on_idle().await;
    Ok(report(begin, results, queue.stats()))
}

/// Push the workload through a frequency-bounded queue and wait for it to drain
pub async fn run_frequency(config: &FrequencyConfig, workload: &Workload) -> Result<QueueReport, QueueError> {
    info!(
        frequency = config.frequency,
        window_ms = config.window_ms,
        tasks = workload.tasks,
        "run_frequency: called"
    );
    let work = workload.work;
    let queue = FrequencyQueue::from_config(config, move |(task, fail): (usize, bool)| simulate(task, work, fail))?;

    let begin = Instant::now();
    let tasks: Vec<_> = (0..workload.tasks)
        .map(|task| queue.add((task, workload.fails(task))))
        .collect();
    queue.start();

    let results = join_all(tasks).await;
    queue.on_idle().await;
    Ok(report(begin, results, queue.stats()))
}

/// Retry an operation that fails `fail_times` times, optionally canceling it
pub async fn run_retry(config: &RetryConfig, fail_times: u32, cancel_after: Option<Duration>) -> RetryReport {
    info!(?config, fail_times, ?cancel_after, "run_retry: called");
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);

    let begin = Instant::now();
    let attempt = retry(
        move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            let fail = call < fail_times;
            simulate(call as usize, Duration::ZERO, fail)
        },
        config.clone(),
    );

    if let Some(after) = cancel_after {
        let canceller = attempt.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            canceller.cancel();
        });
    }

    let outcome = match attempt.await {
        Ok(_) => "succeeded".to_string(),
        Err(RetryError::Canceled) => "canceled".to_string(),
        Err(e @ RetryError::Exhausted { .. }) => e.to_string(),
    };

    RetryReport {
        elapsed_ms: begin.elapsed().as_millis(),
        invocations: invocations.load(Ordering::SeqCst),
        outcome,
    }
}
