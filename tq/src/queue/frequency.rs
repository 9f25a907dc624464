//! Queue bounded by the number of task starts per rolling window

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::admission::{Admission, AdmissionPolicy};
use super::core::TaskQueue;
use super::error::QueueError;
use crate::config::FrequencyConfig;

/// Window used when none is given
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Sliding-log rate limit
///
/// Keeps the start time of every dispatch still inside the window, so no
/// trailing window of length `window` ever holds more than `frequency`
/// starts.
#[derive(Debug, Clone)]
pub struct RateLimit {
    frequency: usize,
    window: Duration,
    starts: VecDeque<Instant>,
}

impl RateLimit {
    pub fn new(frequency: usize, window: Duration) -> Result<Self, QueueError> {
        if frequency == 0 {
            return Err(QueueError::ZeroFrequency);
        }
        if window.is_zero() {
            return Err(QueueError::ZeroWindow);
        }
        Ok(Self {
            frequency,
            window,
            starts: VecDeque::with_capacity(frequency),
        })
    }

    /// Maximum starts per window
    pub fn frequency(&self) -> usize {
        self.frequency
    }

    /// Length of the rolling window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts recorded inside the window ending at `now`
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.starts.len()
    }

    fn prune(&mut self, now: Instant) {
        while self
            .starts
            .front()
            .is_some_and(|start| now.saturating_duration_since(*start) >= self.window)
        {
            self.starts.pop_front();
        }
    }
}

impl AdmissionPolicy for RateLimit {
    fn admit(&mut self, _pending: usize, now: Instant) -> Admission {
        self.prune(now);

        if self.starts.len() < self.frequency {
            self.starts.push_back(now);
            return Admission::Now;
        }

        match self.starts.front() {
            Some(oldest) => Admission::After((*oldest + self.window).saturating_duration_since(now)),
            None => Admission::Now,
        }
    }
}

/// FIFO queue starting at most `frequency` tasks per window
pub type FrequencyQueue<A, T, E> = TaskQueue<A, T, E, RateLimit>;

impl<A, T, E> TaskQueue<A, T, E, RateLimit>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a paused queue admitting `frequency` starts per second
    pub fn new<F, Fut>(frequency: usize, worker: F) -> Result<Self, QueueError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_window(frequency, DEFAULT_WINDOW, worker)
    }

    /// Create a paused queue admitting `frequency` starts per `window`
    pub fn with_window<F, Fut>(frequency: usize, window: Duration, worker: F) -> Result<Self, QueueError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(frequency, ?window, "FrequencyQueue::with_window: called");
        Ok(Self::with_policy(RateLimit::new(frequency, window)?, worker))
    }

    /// Create a queue from configuration, starting it if `autostart` is set
    pub fn from_config<F, Fut>(config: &FrequencyConfig, worker: F) -> Result<Self, QueueError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(?config, "FrequencyQueue::from_config: called");
        let queue = Self::with_window(config.frequency, config.window(), worker)?;
        if config.autostart {
            queue.start();
        }
        Ok(queue)
    }

    pub fn frequency(&self) -> usize {
        self.policy().frequency()
    }

    pub fn window(&self) -> Duration {
        self.policy().window()
    }
}
