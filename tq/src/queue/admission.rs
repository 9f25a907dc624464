//! Admission policies

use std::time::Duration;

use tokio::time::Instant;

/// Outcome of asking a policy whether the head of the queue may start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Dispatch now; the policy has already counted it
    Now,

    /// Blocked until an in-flight task settles
    AfterCompletion,

    /// Blocked for at least this long; the queue re-checks on a timer
    After(Duration),
}

/// Gate consulted by [`TaskQueue`](super::TaskQueue) before every dispatch
///
/// Called with the queue lock held, only when a task is waiting. Returning
/// [`Admission::Now`] commits the dispatch.
pub trait AdmissionPolicy: Send + 'static {
    fn admit(&mut self, pending: usize, now: Instant) -> Admission;
}
