//! Queue statistics

use serde::Serialize;

/// Counters accumulated over the lifetime of a queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks accepted by `add`
    pub added: u64,
    /// Tasks handed to the worker
    pub dispatched: u64,
    /// Worker invocations that returned `Ok`
    pub succeeded: u64,
    /// Worker invocations that returned `Err`
    pub failed: u64,
    /// Queued tasks discarded by `clear`
    pub cleared: u64,
    /// Highest number of tasks in flight at once
    pub peak_pending: usize,
    /// Highest number of tasks waiting at once
    pub peak_size: usize,
}

impl QueueStats {
    /// Tasks dispatched but not yet settled
    pub fn in_flight(&self) -> u64 {
        self.dispatched - self.succeeded - self.failed
    }
}
