//! Queue error types

use thiserror::Error;

/// Configuration errors raised when a queue is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("frequency must be at least 1")]
    ZeroFrequency,

    #[error("rate window must be longer than zero")]
    ZeroWindow,
}
