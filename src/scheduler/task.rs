//! Task wrappers: deadline enforcement, cancellation, lifecycle tracking.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::task::JoinHandle;
use tokio::time::Sleep;

use crate::error::CoreError;
use crate::BoxFuture;

/// Cooperative cancellation signal.
///
/// `cancel()` sets the flag and wakes the task; the wrapper observes it at
/// the next poll and resolves the task with `DeadlineExceeded`, dropping
/// the inner future so its RAII guards run.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                waker: Mutex::new(None),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let waker = self
            .inner
            .waker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    fn register(&self, waker: &Waker) {
        *self.inner.waker.lock().unwrap_or_else(|e| e.into_inner()) = Some(waker.clone());
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct SchedulerShared {
    pub(crate) in_flight: AtomicUsize,
}

/// Increments the in-flight count for the task's lifetime.
pub(crate) struct InFlightGuard {
    shared: Arc<SchedulerShared>,
}

impl InFlightGuard {
    pub(crate) fn enter(shared: Arc<SchedulerShared>) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!("scheduler_in_flight").set(now as f64);
        Self { shared }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.shared.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::gauge!("scheduler_in_flight").set(now as f64);
    }
}

/// The unit the run-loops drive: the task future plus its deadline timer
/// and cancellation flag, both checked on every poll (every wake and every
/// stage transition).
pub(crate) struct TaskFuture<T> {
    pub(crate) inner: BoxFuture<'static, Result<T, CoreError>>,
    pub(crate) deadline: Option<Pin<Box<Sleep>>>,
    pub(crate) cancel: CancelToken,
    pub(crate) _guard: InFlightGuard,
}

impl<T> Future for TaskFuture<T> {
    type Output = Result<T, CoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.cancel.register(cx.waker());
        if this.cancel.is_cancelled() {
            return Poll::Ready(Err(CoreError::DeadlineExceeded));
        }
        if let Some(sleep) = this.deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                tracing::debug!("Task deadline expired");
                return Poll::Ready(Err(CoreError::DeadlineExceeded));
            }
        }
        this.inner.as_mut().poll(cx)
    }
}

/// Handle to a spawned task: await the result, or cancel cooperatively.
pub struct TaskHandle<T> {
    pub(crate) join: JoinHandle<Result<T, CoreError>>,
    pub(crate) cancel: CancelToken,
}

impl<T> TaskHandle<T> {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the task to finish. A panicked task maps to InternalError.
    pub async fn join(self) -> Result<T, CoreError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::Internal(format!("task failed: {}", e))),
        }
    }
}
