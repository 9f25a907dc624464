//! TaskQueue - Admission-controlled async task scheduling
//!
//! Reusable concurrency-control primitives for running async work under an
//! admission policy, built on Tokio.
//!
//! # Core Concepts
//!
//! - **Concurrency queue**: FIFO queue running at most N tasks at once
//! - **Frequency queue**: FIFO queue starting at most N tasks per rolling window
//! - **Retry**: bounded re-invocation with fixed or exponential backoff, cancellable
//! - **Deferred**: a future settled from the outside, used for per-task results
//!   and idle/empty notification
//!
//! Queues start paused. Each `add` returns the task's future immediately;
//! the queue decides when the shared worker runs it. A worker failure only
//! fails that task's future.
//!
//! # Modules
//!
//! - [`queue`] - Task queues and admission policies
//! - [`retry`] - Retry executor
//! - [`deferred`] - Externally settleable futures
//! - [`config`] - Configuration types and loading
//! - [`workload`] - Synthetic workloads driven by the `tq` binary
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod deferred;
pub mod queue;
pub mod retry;
pub mod workload;

// Re-export commonly used types
pub use config::{ConcurrencyConfig, Config, FrequencyConfig, RetryConfig};
pub use deferred::{DeferredFuture, Resolver, Signal, deferred};
pub use queue::{
    Admission, AdmissionPolicy, ConcurrencyLimit, ConcurrencyQueue, FrequencyQueue, QueueError, QueueStats, RateLimit,
    TaskQueue,
};
pub use retry::{Retry, RetryCanceller, RetryError, retry};
