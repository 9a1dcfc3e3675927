// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded-concurrency gate for outbound sub-fetches.
//!
//! At most `max_concurrent` tasks run at once, system-wide for every caller
//! sharing the throttle. Waiters queue in arrival order on a fair
//! [`Semaphore`], so a late caller can never jump ahead of an earlier one.
//!
//! Cancellation: dropping the [`RequestThrottle::run`] future before its
//! permit is granted withdraws the task from the queue. Once a task has
//! started it runs to completion; the throttle never preempts in-flight work.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

/// FIFO concurrency limiter.
pub struct RequestThrottle {
    permits: Semaphore,
    max_concurrent: usize,
    in_flight: AtomicUsize,
    queued: AtomicUsize,
}

/// Decrements the queued gauge even if the waiting future is dropped.
struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RequestThrottle {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            in_flight: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    /// Run `task` once a permit is available.
    pub async fn run<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.queued.fetch_add(1, Ordering::Relaxed);
        crate::metrics::set_throttle_queued(self.queued.load(Ordering::Relaxed));

        let permit = {
            let _queued = QueuedGuard(&self.queued);
            // The semaphore is never closed, so acquire cannot fail.
            self.permits
                .acquire()
                .await
                .expect("throttle semaphore closed")
        };

        self.in_flight.fetch_add(1, Ordering::Relaxed);
        crate::metrics::set_throttle_in_flight(self.in_flight.load(Ordering::Relaxed));

        let result = task().await;

        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::set_throttle_in_flight(self.in_flight.load(Ordering::Relaxed));
        drop(permit);

        result
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Tasks currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Tasks waiting for a permit.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}
