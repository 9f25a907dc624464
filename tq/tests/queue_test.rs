//! Integration tests for the task queues
//!
//! These tests drive the public queue API end to end on a Tokio runtime.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use taskqueue::{ConcurrencyQueue, FrequencyQueue, QueueError, Signal};
use tokio::time::{Instant, timeout};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskFailed(u32);

/// Tracks how many worker invocations overlap
#[derive(Default)]
struct Overlap {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Overlap {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Concurrency Queue Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_adds_before_start_then_drain_within_limit() {
    let overlap = Arc::new(Overlap::default());
    let tracker = Arc::clone(&overlap);
    let queue = ConcurrencyQueue::new(3, move |n: u32| {
        let tracker = Arc::clone(&tracker);
        async move {
            tracker.enter();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tracker.leave();
            Ok::<_, Infallible>(n * 2)
        }
    })
    .unwrap();

    let tasks: Vec<_> = (0..10).map(|n| queue.add(n)).collect();
    assert_eq!(queue.size(), 10);
    assert_eq!(queue.pending(), 0);

    queue.start();
    assert_eq!(queue.size(), 7);
    assert_eq!(queue.pending(), 3);

    let results = join_all(tasks).await;
    assert_eq!(results, (0..10).map(|n| Ok(n * 2)).collect::<Vec<_>>());
    assert_eq!(queue.size(), 0);
    assert_eq!(queue.pending(), 0);
    assert_eq!(overlap.max.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_on_idle_resolves_when_already_idle() {
    let queue = ConcurrencyQueue::new(1, |_: ()| async { Ok::<_, Infallible>(()) }).unwrap();

    timeout(Duration::from_secs(1), queue.on_idle())
        .await
        .expect("idle queue should resolve immediately");
    timeout(Duration::from_secs(1), queue.on_empty())
        .await
        .expect("empty queue should resolve immediately");
}

#[tokio::test(start_paused = true)]
async fn test_on_empty_before_on_idle() {
    let (gate, open) = Signal::pair();
    let queue = ConcurrencyQueue::new(2, move |_: ()| {
        let gate = gate.clone();
        async move {
            gate.await;
            Ok::<_, Infallible>(())
        }
    })
    .unwrap();

    let _first = queue.add(());
    let _second = queue.add(());
    let empty = queue.on_empty();
    let idle = queue.on_idle();

    queue.start();
    timeout(Duration::from_secs(1), empty)
        .await
        .expect("queue should report empty while tasks run");
    assert_eq!(queue.size(), 0);
    assert_eq!(queue.pending(), 2);
    assert!(timeout(Duration::from_secs(1), idle.clone()).await.is_err());

    open.resolve(());
    timeout(Duration::from_secs(1), idle)
        .await
        .expect("queue should go idle once tasks finish");
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_abandons_waiting_tasks() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move { Ok::<_, Infallible>(n) }).unwrap();

    let tasks: Vec<_> = (0..3).map(|n| queue.add(n)).collect();
    assert_eq!(queue.clear(), 3);
    assert_eq!(queue.size(), 0);

    queue.start();
    for task in tasks {
        assert!(timeout(Duration::from_secs(10), task).await.is_err());
    }
    assert_eq!(queue.stats().dispatched, 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_leaves_in_flight_tasks() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, Infallible>(n)
    })
    .unwrap();
    queue.start();

    let running = queue.add(1);
    let _dropped = queue.add(2);
    assert_eq!(queue.clear(), 1);

    assert_eq!(running.await, Ok(1));
    assert_eq!(queue.stats().dispatched, 1);
}

#[tokio::test]
async fn test_failure_does_not_stop_queue() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move {
        if n == 0 { Err(TaskFailed(n)) } else { Ok(n) }
    })
    .unwrap();

    let first = queue.add(0);
    let second = queue.add(1);
    let third = queue.add(2);
    queue.start();

    assert_eq!(first.await, Err(TaskFailed(0)));
    assert_eq!(second.await, Ok(1));
    assert_eq!(third.await, Ok(2));
    assert!(queue.is_started());
    assert_eq!(queue.stats().failed, 1);
}

#[tokio::test]
async fn test_queues_share_scheduler_fairly() {
    let log = Arc::new(Mutex::new(String::new()));

    let make_queue = |name: char| {
        let log = Arc::clone(&log);
        ConcurrencyQueue::new(1, move |_: u32| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok::<_, Infallible>(())
            }
        })
        .unwrap()
    };
    let a = make_queue('a');
    let b = make_queue('b');

    let a_tasks: Vec<_> = (0..10).map(|n| a.add(n)).collect();
    let b_tasks: Vec<_> = (0..10).map(|n| b.add(n)).collect();
    a.start();
    b.start();

    join_all(a_tasks).await;
    join_all(b_tasks).await;

    assert_eq!(*log.lock().unwrap(), "ab".repeat(10));
}

#[tokio::test(start_paused = true)]
async fn test_worker_panic_does_not_wedge_queue() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move {
        if n == 0 {
            panic!("worker blew up on {n}");
        }
        Ok::<_, Infallible>(n)
    })
    .unwrap();

    let panicked = queue.add(0);
    let second = queue.add(1);
    let idle = queue.on_idle();
    queue.start();

    let result = timeout(Duration::from_secs(1), second)
        .await
        .expect("queue should move past a panicking worker");
    assert_eq!(result, Ok(1));
    timeout(Duration::from_secs(1), idle)
        .await
        .expect("queue should go idle after a panic");

    assert_eq!(queue.pending(), 0);
    assert_eq!(queue.stats().failed, 1);
    assert_eq!(queue.stats().succeeded, 1);
    assert!(timeout(Duration::from_secs(10), panicked).await.is_err());
}

#[tokio::test]
async fn test_zero_concurrency_is_config_error() {
    let result = ConcurrencyQueue::new(0, |_: ()| async { Ok::<_, Infallible>(()) });
    assert_eq!(result.err(), Some(QueueError::ZeroConcurrency));
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_new_dispatches() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, Infallible>(n)
    })
    .unwrap();

    let first = queue.add(1);
    let second = queue.add(2);
    queue.start();
    queue.pause();

    assert_eq!(first.await, Ok(1));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.size(), 1);
    assert_eq!(queue.pending(), 0);

    queue.start();
    assert_eq!(second.await, Ok(2));
}

#[tokio::test(start_paused = true)]
async fn test_handles_share_one_queue() {
    let queue = ConcurrencyQueue::new(1, |n: u32| async move { Ok::<_, Infallible>(n) }).unwrap();
    let handle = queue.clone();

    let task = handle.add(7);
    assert_eq!(queue.size(), 1);

    queue.start();
    assert!(handle.is_started());
    assert_eq!(task.await, Ok(7));
}

// =============================================================================
// Frequency Queue Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_frequency_never_bursts_above_ceiling() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&starts);
    let window = Duration::from_millis(200);
    let queue = FrequencyQueue::with_window(3, window, move |n: u32| {
        let recorder = Arc::clone(&recorder);
        async move {
            recorder.lock().unwrap().push(Instant::now());
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, Infallible>(n)
        }
    })
    .unwrap();

    let tasks: Vec<_> = (0..10).map(|n| queue.add(n)).collect();
    queue.start();
    let results = join_all(tasks).await;
    assert_eq!(results, (0..10).map(Ok).collect::<Vec<_>>());

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 10);
    for (i, start) in starts.iter().enumerate() {
        let inside = starts[i..].iter().filter(|t| **t - *start < window).count();
        assert!(inside <= 3, "{inside} starts inside one window");
    }
}

#[tokio::test(start_paused = true)]
async fn test_frequency_failure_does_not_stop_queue() {
    let queue = FrequencyQueue::new(2, |n: u32| async move {
        if n == 0 { Err(TaskFailed(n)) } else { Ok(n) }
    })
    .unwrap();

    let tasks: Vec<_> = (0..3).map(|n| queue.add(n)).collect();
    queue.start();

    let results = join_all(tasks).await;
    assert_eq!(results, vec![Err(TaskFailed(0)), Ok(1), Ok(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_pause_holds_timer_dispatch() {
    let queue = FrequencyQueue::new(1, |n: u32| async move { Ok::<_, Infallible>(n) }).unwrap();

    let first = queue.add(1);
    let second = queue.add(2);
    queue.start();
    assert_eq!(first.await, Ok(1));

    queue.pause();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.size(), 1);

    queue.start();
    assert_eq!(second.await, Ok(2));
    assert_eq!(queue.size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_on_idle_waits_for_throttled_tasks() {
    let queue = FrequencyQueue::new(1, |_: ()| async { Ok::<_, Infallible>(()) }).unwrap();
    let begin = Instant::now();

    let _ = queue.add(());
    let _ = queue.add(());
    let _ = queue.add(());
    let idle = queue.on_idle();
    queue.start();

    idle.await;
    assert!(begin.elapsed() >= Duration::from_secs(2));
    assert_eq!(queue.stats().dispatched, 3);
}
