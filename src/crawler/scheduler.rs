//! Bounded worker pool with quiescence detection
//!
//! This module handles:
//! - An explicit FIFO worklist of crawl tasks
//! - A fixed number of workers, which bounds outbound requests
//! - Detecting completion when tasks keep submitting more tasks
//! - Dropping queued work once the crawl is cancelled
//!
//! Completion cannot be a countdown because the total amount of work is only
//! known once the tree has been walked. The pool is drained when the worklist
//! is empty *and* no task is being processed; only then can no new task
//! appear.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Worklist<T> {
    tasks: VecDeque<T>,
    in_flight: usize,
}

#[derive(Debug)]
struct Inner<T> {
    limit: usize,
    cancel: CancellationToken,
    worklist: Mutex<Worklist<T>>,
    notify: Notify,
    submitted: AtomicUsize,
}

/// Shared handle to the worklist
///
/// Clones refer to the same pool, so a task handler can keep one to submit
/// the work it discovers.
#[derive(Debug)]
pub struct Scheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Marks a popped task as finished when dropped, even if its handler panics
struct InFlight<'a, T> {
    scheduler: &'a Scheduler<T>,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.scheduler.finish_task();
    }
}

impl<T> Scheduler<T> {
    fn lock(&self) -> MutexGuard<'_, Worklist<T>> {
        self.inner
            .worklist
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Called from the `InFlight` guard, which carries no `Send` bound
    fn finish_task(&self) {
        let quiescent = {
            let mut worklist = self.lock();
            worklist.in_flight = worklist.in_flight.saturating_sub(1);
            worklist.in_flight == 0 && worklist.tasks.is_empty()
        };

        if quiescent {
            self.inner.notify.notify_waiters();
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Creates a pool that will run at most `limit` tasks at once
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                cancel,
                worklist: Mutex::new(Worklist {
                    tasks: VecDeque::new(),
                    in_flight: 0,
                }),
                notify: Notify::new(),
                submitted: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueues a task
    ///
    /// Returns false, dropping the task, once the crawl has been cancelled.
    pub fn submit(&self, task: T) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }

        self.lock().tasks.push_back(task);
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.notify.notify_one();
        true
    }

    /// Tasks waiting in the worklist
    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Tasks currently being processed
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Tasks accepted since the pool was created
    pub fn submitted(&self) -> usize {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Runs `handler` on every task until the pool is quiescent
    ///
    /// Returns once the worklist is empty and no handler is running, or once
    /// the crawl is cancelled and the handlers already running have finished.
    pub async fn await_drain<F, Fut>(&self, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut workers = JoinSet::new();

        for worker_id in 0..self.inner.limit {
            let scheduler = self.clone();
            let handler = Arc::clone(&handler);
            workers.spawn(async move {
                scheduler.run_worker(worker_id, handler).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Crawl worker terminated abnormally: {}", e);
            }
        }

        // Anything left over was submitted after cancellation raced the drain
        self.lock().tasks.clear();
    }

    async fn run_worker<F, Fut>(self, worker_id: usize, handler: Arc<F>)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        while let Some(task) = self.next_task().await {
            let _in_flight = InFlight { scheduler: &self };
            handler(task).await;
        }
        tracing::trace!("Worker {} finished", worker_id);
    }

    /// Pops the next task, waiting while other workers may still produce one
    ///
    /// Returns None at quiescence or after cancellation.
    async fn next_task(&self) -> Option<T> {
        loop {
            // Register interest before inspecting the worklist so a
            // notification sent in between is not lost.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut worklist = self.lock();

                if self.inner.cancel.is_cancelled() {
                    let dropped = worklist.tasks.len();
                    worklist.tasks.clear();
                    if dropped > 0 {
                        tracing::debug!("Dropped {} queued tasks after cancellation", dropped);
                    }
                    return None;
                }

                if let Some(task) = worklist.tasks.pop_front() {
                    worklist.in_flight += 1;
                    return Some(task);
                }

                if worklist.in_flight == 0 {
                    drop(worklist);
                    self.inner.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.inner.cancel.cancelled() => {}
            }
        }
    }
}
