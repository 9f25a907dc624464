//! Shared queue implementation

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::admission::{Admission, AdmissionPolicy};
use super::stats::QueueStats;
use crate::deferred::{DeferredFuture, Resolver, Signal, deferred};

type Worker<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A queued task and the resolver promised to the caller of `add`
struct TaskEntry<A, T, E> {
    argument: A,
    resolver: Resolver<T, E>,
}

/// Outstanding idle/empty notification
struct Waiter {
    signal: Signal,
    resolver: Resolver<(), Infallible>,
}

impl Waiter {
    fn new() -> Self {
        let (signal, resolver) = Signal::pair();
        Self { signal, resolver }
    }
}

/// Internal state protected by mutex
struct QueueState<A, T, E, L> {
    /// Waiting tasks, in dispatch order
    entries: VecDeque<TaskEntry<A, T, E>>,

    /// Tasks dispatched but not yet settled
    pending: usize,

    started: bool,

    policy: L,

    /// A re-check timer is already scheduled
    timer_armed: bool,

    idle: Option<Waiter>,
    empty: Option<Waiter>,

    stats: QueueStats,
}

struct QueueInner<A, T, E, L> {
    worker: Worker<A, T, E>,
    state: Mutex<QueueState<A, T, E, L>>,
}

/// FIFO task queue whose dispatches are gated by an [`AdmissionPolicy`]
///
/// Every task is one invocation of the worker supplied at construction. The
/// queue starts paused; nothing is dispatched until [`start`](Self::start).
/// Dispatched tasks run as spawned Tokio tasks, so `add` and `start` must be
/// called from within a runtime.
///
/// A finished task hands the next dispatch to a freshly spawned Tokio task,
/// which queues it behind whatever else is ready and lets independent queues
/// on the same current-thread runtime take strict turns. On the multi-thread
/// runtime the same code only guarantees that no queue starves another, not
/// strict alternation.
///
/// A worker that panics counts as a failed task whose future never
/// completes; the queue carries on with the next one.
///
/// Handles are cheap to clone and all refer to the same queue.
pub struct TaskQueue<A, T, E, L> {
    inner: Arc<QueueInner<A, T, E, L>>,
}

impl<A, T, E, L> TaskQueue<A, T, E, L>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    L: AdmissionPolicy,
{
    /// Create a paused queue gated by an arbitrary admission policy
    pub fn with_policy<F, Fut>(policy: L, worker: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!("TaskQueue::with_policy: called");
        let worker: Worker<A, T, E> = Arc::new(move |argument: A| worker(argument).boxed());
        Self {
            inner: Arc::new(QueueInner {
                worker,
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    pending: 0,
                    started: false,
                    policy,
                    timer_armed: false,
                    idle: None,
                    empty: None,
                    stats: QueueStats::default(),
                }),
            }),
        }
    }

    /// Append a task and return the future of its result
    ///
    /// Never fails itself; a worker error is delivered through the returned
    /// future. The future never completes if the task is discarded by
    /// [`clear`](Self::clear).
    pub fn add(&self, argument: A) -> DeferredFuture<T, E> {
        let (future, resolver) = deferred();
        {
            let mut state = self.inner.lock();
            state.entries.push_back(TaskEntry { argument, resolver });
            state.stats.added += 1;
            state.stats.peak_size = state.stats.peak_size.max(state.entries.len());
            debug!(size = state.entries.len(), "TaskQueue::add: queued");
        }
        self.inner.dispatch();
        future
    }

    /// Number of tasks waiting to be dispatched
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Number of tasks currently in flight
    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    /// Discard every waiting task, returning how many were dropped
    ///
    /// Their futures are abandoned and never complete. In-flight tasks are
    /// unaffected.
    pub fn clear(&self) -> usize {
        let (discarded, fired) = {
            let mut state = self.inner.lock();
            let discarded = state.entries.len();
            state.entries.clear();
            state.stats.cleared += discarded as u64;

            let mut fired = Vec::new();
            fired.extend(state.empty.take());
            if state.pending == 0 {
                fired.extend(state.idle.take());
            }
            (discarded, fired)
        };
        debug!(discarded, "TaskQueue::clear: discarded waiting tasks");
        fire(fired);
        discarded
    }

    /// Resume dispatching. Idempotent.
    pub fn start(&self) {
        debug!("TaskQueue::start: called");
        self.inner.lock().started = true;
        self.inner.dispatch();
    }

    /// Stop dispatching new tasks; in-flight tasks run to completion. Idempotent.
    pub fn pause(&self) {
        debug!("TaskQueue::pause: called");
        self.inner.lock().started = false;
    }

    /// Whether the queue is currently dispatching
    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    /// Completes once nothing is waiting and nothing is in flight
    ///
    /// Already complete if that holds now. Calls made while a previous
    /// notification is outstanding share it.
    pub fn on_idle(&self) -> Signal {
        let mut state = self.inner.lock();
        if let Some(waiter) = &state.idle {
            return waiter.signal.clone();
        }
        if state.entries.is_empty() && state.pending == 0 {
            return Signal::ready();
        }
        let waiter = Waiter::new();
        let signal = waiter.signal.clone();
        state.idle = Some(waiter);
        signal
    }

    /// Completes once nothing is waiting, regardless of tasks in flight
    ///
    /// Same sharing and short-circuit rules as [`on_idle`](Self::on_idle).
    pub fn on_empty(&self) -> Signal {
        let mut state = self.inner.lock();
        if let Some(waiter) = &state.empty {
            return waiter.signal.clone();
        }
        if state.entries.is_empty() {
            return Signal::ready();
        }
        let waiter = Waiter::new();
        let signal = waiter.signal.clone();
        state.empty = Some(waiter);
        signal
    }

    /// Snapshot of the lifetime counters
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats
    }

    /// Snapshot of the admission policy
    pub fn policy(&self) -> L
    where
        L: Clone,
    {
        self.inner.lock().policy.clone()
    }
}

impl<A, T, E, L> QueueInner<A, T, E, L>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    L: AdmissionPolicy,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<A, T, E, L>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch as many waiting tasks as the policy admits
    fn dispatch(self: &Arc<Self>) {
        let mut fired = Vec::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.started {
                return;
            }

            while !state.entries.is_empty() {
                match state.policy.admit(state.pending, Instant::now()) {
                    Admission::Now => {}
                    Admission::AfterCompletion => break,
                    Admission::After(delay) => {
                        if !state.timer_armed {
                            state.timer_armed = true;
                            self.arm_timer(delay);
                        }
                        break;
                    }
                }

                let Some(entry) = state.entries.pop_front() else {
                    break;
                };
                state.pending += 1;
                state.stats.dispatched += 1;
                state.stats.peak_pending = state.stats.peak_pending.max(state.pending);
                debug!(
                    pending = state.pending,
                    size = state.entries.len(),
                    "TaskQueue::dispatch: starting task"
                );

                if state.entries.is_empty() {
                    fired.extend(state.empty.take());
                }

                self.spawn_task(entry);
            }
        }
        fire(fired);
    }

    fn spawn_task(self: &Arc<Self>, entry: TaskEntry<A, T, E>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let TaskEntry { argument, resolver } = entry;
            let worker = Arc::clone(&inner.worker);
            let outcome = AssertUnwindSafe(async move { worker(argument).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => {
                    let idle = inner.complete(result.is_ok());
                    resolver.settle(result);
                    fire(idle);
                }
                Err(_) => {
                    // No result to deliver; the task's future is abandoned
                    warn!("TaskQueue::spawn_task: worker panicked");
                    let idle = inner.complete(false);
                    drop(resolver);
                    fire(idle);
                }
            }

            // Dispatch from the back of the run queue so sibling queues take turns
            tokio::spawn(async move { inner.dispatch() });
        });
    }

    /// Settle the bookkeeping for a finished task, returning the idle waiter if it is due
    fn complete(&self, ok: bool) -> Option<Waiter> {
        let mut state = self.lock();
        state.pending -= 1;
        if ok {
            state.stats.succeeded += 1;
        } else {
            state.stats.failed += 1;
        }
        debug!(pending = state.pending, ok, "TaskQueue::complete: task settled");

        if state.entries.is_empty() && state.pending == 0 {
            state.idle.take()
        } else {
            None
        }
    }

    fn arm_timer(self: &Arc<Self>, delay: Duration) {
        debug!(?delay, "TaskQueue::arm_timer: admission deferred");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.lock().timer_armed = false;
            inner.dispatch();
        });
    }
}

fn fire(waiters: impl IntoIterator<Item = Waiter>) {
    for waiter in waiters {
        waiter.resolver.resolve(());
    }
}

impl<A, T, E, L> Clone for TaskQueue<A, T, E, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E, L> fmt::Debug for TaskQueue<A, T, E, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TaskQueue")
            .field("size", &state.entries.len())
            .field("pending", &state.pending)
            .field("started", &state.started)
            .finish_non_exhaustive()
    }
}
