//! Queue bounded by the number of tasks in flight

use std::future::Future;

use tokio::time::Instant;
use tracing::debug;

use super::admission::{Admission, AdmissionPolicy};
use super::core::TaskQueue;
use super::error::QueueError;
use crate::config::ConcurrencyConfig;

/// Admits while fewer than `limit` tasks are in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimit {
    limit: usize,
}

impl ConcurrencyLimit {
    pub fn new(limit: usize) -> Result<Self, QueueError> {
        if limit == 0 {
            return Err(QueueError::ZeroConcurrency);
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl AdmissionPolicy for ConcurrencyLimit {
    fn admit(&mut self, pending: usize, _now: Instant) -> Admission {
        if pending < self.limit {
            Admission::Now
        } else {
            Admission::AfterCompletion
        }
    }
}

/// FIFO queue running at most `concurrency` tasks at once
pub type ConcurrencyQueue<A, T, E> = TaskQueue<A, T, E, ConcurrencyLimit>;

impl<A, T, E> TaskQueue<A, T, E, ConcurrencyLimit>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a paused queue
    ///
    /// Fails if `concurrency` is zero.
    pub fn new<F, Fut>(concurrency: usize, worker: F) -> Result<Self, QueueError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(concurrency, "ConcurrencyQueue::new: called");
        Ok(Self::with_policy(ConcurrencyLimit::new(concurrency)?, worker))
    }

    /// Create a queue from configuration, starting it if `autostart` is set
    pub fn from_config<F, Fut>(config: &ConcurrencyConfig, worker: F) -> Result<Self, QueueError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(?config, "ConcurrencyQueue::from_config: called");
        let queue = Self::new(config.concurrency, worker)?;
        if config.autostart {
            queue.start();
        }
        Ok(queue)
    }

    pub fn concurrency(&self) -> usize {
        self.policy().limit()
    }
}
