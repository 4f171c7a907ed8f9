//! The scheduler: fixed worker run-loops plus task lifecycle tracking.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::CoreError;
use crate::scheduler::task::{CancelToken, InFlightGuard, SchedulerShared, TaskFuture, TaskHandle};

/// Drives pipeline tasks on a fixed pool of non-blocking worker loops.
///
/// Tasks are futures; a suspended task parks a `Waker` at its suspension
/// point and is re-queued when the awaited event fires. The scheduler adds
/// the pieces the runtime does not dictate: per-task deadlines checked on
/// every poll, cooperative cancellation, and an in-flight count that backs
/// graceful drain.
pub struct Scheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    shared: Arc<SchedulerShared>,
}

impl Scheduler {
    /// Build a scheduler owning its worker threads.
    pub fn new(config: &SchedulerConfig) -> Result<Self, CoreError> {
        let workers = config.resolved_workers();
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("core-worker")
            .enable_all()
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build worker pool: {}", e)))?;
        tracing::info!(workers, "Scheduler worker pool started");
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            shared: Arc::new(SchedulerShared {
                in_flight: AtomicUsize::new(0),
            }),
        })
    }

    /// Scheduler borrowing the ambient runtime (tests, embedding).
    ///
    /// Panics outside a tokio runtime, like `Handle::current`.
    pub fn current() -> Self {
        Self {
            runtime: None,
            handle: Handle::current(),
            shared: Arc::new(SchedulerShared {
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Spawn a task, optionally bounded by a deadline.
    ///
    /// Deadline expiry or `TaskHandle::cancel` resolve the task with
    /// `DeadlineExceeded` at its next poll; the task future is dropped so
    /// every RAII guard (connection lease included) runs on that path.
    pub fn spawn<F, T>(&self, future: F, deadline: Option<Instant>) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, CoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancelToken::new();
        let task = TaskFuture {
            inner: Box::pin(future),
            deadline: deadline.map(|d| Box::pin(tokio::time::sleep_until(d))),
            cancel: cancel.clone(),
            _guard: InFlightGuard::enter(self.shared.clone()),
        };
        let join = self.handle.spawn(task);
        TaskHandle { join, cancel }
    }

    /// Tasks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every in-flight task finishes, bounded by `timeout`.
    /// Returns true when fully drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.in_flight() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let remaining = self.in_flight();
        if remaining > 0 {
            tracing::warn!(remaining, "Drain timed out with tasks still in flight");
        }
        remaining == 0
    }

    /// Run a future to completion on the owned worker pool.
    ///
    /// Only valid for a scheduler built with [`Scheduler::new`]; a borrowed
    /// scheduler has no thread it may block.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, CoreError> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(CoreError::Internal(
                "block_on requires an owned worker pool".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_join() {
        let scheduler = Scheduler::current();
        let handle = scheduler.spawn(async { Ok::<_, CoreError>(41 + 1) }, None);
        assert_eq!(handle.join().await.unwrap(), 42);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_deadline_maps_to_deadline_exceeded() {
        let scheduler = Scheduler::current();
        let deadline = Instant::now() + Duration::from_millis(20);
        let handle = scheduler.spawn(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, CoreError>(())
            },
            Some(deadline),
        );
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, CoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_observed_at_next_poll() {
        let scheduler = Scheduler::current();
        let handle = scheduler.spawn(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, CoreError>(())
            },
            None,
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, CoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let scheduler = Scheduler::current();
        let _handle = scheduler.spawn(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, CoreError>(())
            },
            None,
        );
        assert_eq!(scheduler.in_flight(), 1);
        assert!(scheduler.drain(Duration::from_secs(2)).await);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let scheduler = Scheduler::current();
        let handle = scheduler.spawn(
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, CoreError>(())
            },
            None,
        );
        assert!(!scheduler.drain(Duration::from_millis(50)).await);
        handle.cancel();
    }
}
