//! Externally settleable futures
//!
//! A [`DeferredFuture`] is completed from the outside through its
//! [`Resolver`]. The queues hand one to every caller of `add`, and their
//! idle/empty notifications are [`Signal`]s built on the same primitive.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::Shared;
use tokio::sync::oneshot;

/// Create a linked future/resolver pair
pub fn deferred<T, E>() -> (DeferredFuture<T, E>, Resolver<T, E>) {
    let (tx, rx) = oneshot::channel();
    (
        DeferredFuture { rx, abandoned: false },
        Resolver {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
    )
}

/// Consumer half of a deferred
///
/// Completes with whatever the first [`Resolver`] call supplied. If every
/// resolver is dropped before settling, it never completes.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct DeferredFuture<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
    abandoned: bool,
}

impl<T, E> Future for DeferredFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.abandoned {
            return Poll::Pending;
        }

        match self.rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                // Nobody is left to settle us
                self.abandoned = true;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer half of a deferred
///
/// Cloneable; the first `resolve`/`reject`/`settle` across all clones wins
/// and later calls are no-ops.
pub struct Resolver<T, E> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T, E>>>>>,
}

impl<T, E> Resolver<T, E> {
    /// Complete the future with a value. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Complete the future with an error. Returns false if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// Complete the future with a result. Returns false if already settled.
    pub fn settle(&self, result: Result<T, E>) -> bool {
        let sender = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => {
                // The consumer may have been dropped; that still counts as settled
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("settled", &self.is_settled()).finish()
    }
}

/// Cloneable completion notice with no payload
///
/// Every clone completes when the paired resolver fires.
#[derive(Clone)]
#[must_use = "futures do nothing unless awaited"]
pub struct Signal {
    inner: Shared<DeferredFuture<(), Infallible>>,
}

impl Signal {
    /// Create an unfired signal together with the resolver that fires it
    pub fn pair() -> (Self, Resolver<(), Infallible>) {
        let (future, resolver) = deferred();
        (Self { inner: future.shared() }, resolver)
    }

    /// A signal that has already fired
    pub fn ready() -> Self {
        let (signal, resolver) = Self::pair();
        resolver.resolve(());
        signal
    }

    /// Whether both handles observe the same underlying deferred
    pub fn same_as(&self, other: &Signal) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl Future for Signal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx).map(|_| ())
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}
