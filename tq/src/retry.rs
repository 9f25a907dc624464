//! Cancellable retry with backoff
//!
//! [`retry`] re-invokes an async callback until it succeeds or the attempt
//! budget runs out, sleeping between attempts as configured by
//! [`RetryConfig`]. The attempt loop runs on its own Tokio task; the returned
//! [`Retry`] is a future of the final outcome plus a cancel switch.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::deferred::{DeferredFuture, Resolver, deferred};

/// Terminal failure of a [`Retry`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// Stopped by [`Retry::cancel`] before any attempt succeeded
    #[error("retry canceled")]
    Canceled,

    /// Every attempt failed; carries the error of the first one
    #[error("all {attempts} attempts failed: {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, RetryError::Canceled)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// The first attempt's error, if the retry ran out of attempts
    pub fn into_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Canceled => None,
        }
    }
}

/// Run `callback` until it succeeds, at most `config.retries + 1` times
///
/// Must be called from within a Tokio runtime.
pub fn retry<F, Fut, T, E>(callback: F, config: RetryConfig) -> Retry<T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    debug!(?config, "retry: called");
    let (future, resolver) = deferred();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let canceller = RetryCanceller {
        resolver: resolver.clone(),
        cancel_tx: Arc::new(cancel_tx),
    };

    tokio::spawn(run_attempts(callback, config, resolver, cancel_rx));

    Retry { future, canceller }
}

async fn run_attempts<F, Fut, T, E>(
    mut callback: F,
    config: RetryConfig,
    resolver: Resolver<T, RetryError<E>>,
    mut cancel_rx: watch::Receiver<bool>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.attempts();
    let mut first_error = None;

    for attempt in 0..attempts {
        if *cancel_rx.borrow() {
            debug!(attempt, "run_attempts: canceled before attempt");
            return;
        }

        debug!(attempt, "run_attempts: attempting");
        let outcome = tokio::select! {
            biased;
            _ = canceled(&mut cancel_rx) => {
                debug!(attempt, "run_attempts: canceled during attempt");
                return;
            }
            outcome = callback() => outcome,
        };

        match outcome {
            Ok(value) => {
                debug!(attempt, "run_attempts: succeeded");
                resolver.resolve(value);
                return;
            }
            Err(error) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        if attempt + 1 < attempts {
            let delay = config.backoff(attempt);
            warn!(attempt, ?delay, "run_attempts: attempt failed, backing off");
            tokio::select! {
                biased;
                _ = canceled(&mut cancel_rx) => {
                    debug!(attempt, "run_attempts: canceled while waiting");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    if let Some(error) = first_error {
        debug!(attempts, "run_attempts: exhausted");
        resolver.reject(RetryError::Exhausted { attempts, error });
    }
}

/// Completes once cancellation is requested or every canceller is gone
async fn canceled(cancel_rx: &mut watch::Receiver<bool>) {
    let _ = cancel_rx.wait_for(|canceled| *canceled).await;
}

/// Handle to a running retry
///
/// Resolves to the first successful result, or a [`RetryError`]. Dropping it
/// before it settles cancels the retry.
#[must_use = "futures do nothing unless awaited"]
pub struct Retry<T, E> {
    future: DeferredFuture<T, RetryError<E>>,
    canceller: RetryCanceller<T, E>,
}

impl<T, E> Retry<T, E> {
    /// Stop retrying and settle as [`RetryError::Canceled`]
    ///
    /// Returns false if the retry had already settled.
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// A detached handle that can cancel this retry from elsewhere
    pub fn canceller(&self) -> RetryCanceller<T, E> {
        self.canceller.clone()
    }
}

impl<T, E> Future for Retry<T, E> {
    type Output = Result<T, RetryError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.poll_unpin(cx)
    }
}

impl<T, E> Drop for Retry<T, E> {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

impl<T, E> fmt::Debug for Retry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").field("canceller", &self.canceller).finish_non_exhaustive()
    }
}

/// Cloneable cancel switch for a [`Retry`]
pub struct RetryCanceller<T, E> {
    resolver: Resolver<T, RetryError<E>>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl<T, E> RetryCanceller<T, E> {
    /// Stop retrying and settle as [`RetryError::Canceled`]
    ///
    /// Returns false if the retry had already settled.
    pub fn cancel(&self) -> bool {
        if !self.resolver.reject(RetryError::Canceled) {
            return false;
        }
        debug!("RetryCanceller::cancel: canceled");
        self.cancel_tx.send_replace(true);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.resolver.is_settled()
    }
}

impl<T, E> Clone for RetryCanceller<T, E> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            cancel_tx: Arc::clone(&self.cancel_tx),
        }
    }
}

impl<T, E> fmt::Debug for RetryCanceller<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCanceller").field("settled", &self.is_settled()).finish()
    }
}
