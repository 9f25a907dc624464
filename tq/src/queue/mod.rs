//! Admission-controlled task queues
//!
//! Both queues share one dispatcher ([`TaskQueue`]) and differ only in the
//! [`AdmissionPolicy`] that gates each dispatch: a ceiling on tasks in
//! flight, or a ceiling on task starts per rolling window.

mod admission;
mod concurrency;
mod core;
mod error;
mod frequency;
mod stats;

pub use admission::{Admission, AdmissionPolicy};
pub use concurrency::{ConcurrencyLimit, ConcurrencyQueue};
pub use self::core::TaskQueue;
pub use error::QueueError;
pub use frequency::{DEFAULT_WINDOW, FrequencyQueue, RateLimit};
pub use stats::QueueStats;
