//! The connection pool proper.
//!
//! `acquire` is a hand-written future so the wake/resume contract stays
//! explicit: a waiter parks its `Waker` in a slot on the FIFO queue and
//! `release` wakes exactly the oldest live waiter, handing the connection
//! over directly without a trip through the idle stack.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

use crate::config::PoolConfig;
use crate::error::CoreError;
use crate::pool::connection::{ConnState, Connector, DatabaseConnection, PooledConnection};
use crate::pool::lease::ConnectionLease;
use crate::BoxFuture;

/// Snapshot of pool occupancy, for gauges and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub leased: usize,
    pub waiters: usize,
    pub opening: usize,
}

pub(crate) struct PoolInner {
    /// Idle connections, most recently released last (LIFO reuse).
    idle: Vec<PooledConnection>,
    /// Pending acquires in arrival order (FIFO fairness).
    waiters: VecDeque<Arc<WaitSlot>>,
    leased: usize,
    /// Connects in flight; each reserves one capacity slot.
    opening: usize,
    next_id: u64,
}

impl PoolInner {
    fn total(&self) -> usize {
        self.leased + self.idle.len() + self.opening
    }
}

enum SlotState {
    Waiting(Option<Waker>),
    Delivered(PooledConnection),
    Cancelled,
}

/// One pending acquire. Shared between the waiter queue and the
/// suspended `Acquire` future.
pub(crate) struct WaitSlot {
    state: Mutex<SlotState>,
}

impl WaitSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Waiting(None)),
        })
    }

    /// Hand a connection to this waiter. Fails (returning the connection)
    /// if the waiter already timed out or was cancelled.
    fn deliver(&self, conn: PooledConnection) -> Result<(), PooledConnection> {
        let mut state = lock_unpoisoned(&self.state);
        match &*state {
            SlotState::Waiting(_) => {
                let prev = std::mem::replace(&mut *state, SlotState::Delivered(conn));
                drop(state);
                if let SlotState::Waiting(Some(waker)) = prev {
                    waker.wake();
                }
                Ok(())
            }
            _ => Err(conn),
        }
    }
}

pub(crate) struct PoolShared {
    inner: Mutex<PoolInner>,
    connector: Box<dyn Connector>,
    config: PoolConfig,
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        lock_unpoisoned(&self.inner)
    }

    /// Pop idle connections LIFO, closing any older than the idle TTL so a
    /// stale server-side-closed connection is never handed out.
    fn take_idle(&self, inner: &mut PoolInner) -> Option<PooledConnection> {
        while let Some(mut conn) = inner.idle.pop() {
            if conn.last_used.elapsed() >= self.config.idle_ttl() {
                conn.state = ConnState::Closed;
                tracing::debug!(conn_id = conn.id, "Closing idle connection past TTL");
                continue;
            }
            return Some(conn);
        }
        None
    }

    /// Route a connection to the oldest live waiter, or park it idle.
    ///
    /// `was_leased` tells whether the connection is currently counted in
    /// `leased` (a release) or not yet counted (a fresh replacement).
    fn route_locked(&self, inner: &mut PoolInner, mut conn: PooledConnection, was_leased: bool) {
        while let Some(slot) = inner.waiters.pop_front() {
            conn.state = ConnState::Leased;
            match slot.deliver(conn) {
                Ok(()) => {
                    if !was_leased {
                        inner.leased += 1;
                    }
                    self.publish_gauges(inner);
                    return;
                }
                // Waiter timed out; try the next one.
                Err(returned) => conn = returned,
            }
        }
        if was_leased {
            inner.leased -= 1;
        }
        conn.state = ConnState::Idle;
        conn.last_used = Instant::now();
        tracing::debug!(conn_id = conn.id, "Connection returned to idle");
        inner.idle.push(conn);
        self.publish_gauges(inner);
    }

    /// Release path: called by `ConnectionLease::drop` on every exit.
    pub(crate) fn hand_back(&self, conn: PooledConnection) {
        let mut inner = self.lock();
        self.route_locked(&mut inner, conn, true);
    }

    /// Close a broken connection, freeing its capacity slot. When waiters
    /// are queued, a replacement connect is started on their behalf.
    pub(crate) fn invalidate_conn(self: &Arc<Self>, mut conn: PooledConnection) {
        let mut inner = self.lock();
        inner.leased -= 1;
        conn.state = ConnState::Closed;
        tracing::info!(conn_id = conn.id, "Connection invalidated");
        drop(conn);

        if !inner.waiters.is_empty() && inner.total() < self.config.capacity {
            inner.opening += 1;
            self.publish_gauges(&inner);
            drop(inner);
            self.spawn_replacement();
        } else {
            self.publish_gauges(&inner);
        }
    }

    /// Open a replacement connection in the background and route it to the
    /// oldest waiter (or idle if everyone gave up by then).
    fn spawn_replacement(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            let mut inner = self.lock();
            inner.opening -= 1;
            tracing::warn!("No runtime available to open replacement connection");
            return;
        };
        let shared = self.clone();
        handle.spawn(async move {
            match shared.connector.connect().await {
                Ok(boxed) => {
                    let mut inner = shared.lock();
                    inner.opening -= 1;
                    let id = inner.next_id;
                    inner.next_id += 1;
                    let mut conn = PooledConnection::new_leased(id, boxed);
                    tracing::debug!(conn_id = id, "Replacement connection opened");
                    // Not yet counted as leased: route decides.
                    conn.state = ConnState::Idle;
                    shared.route_locked(&mut inner, conn, false);
                }
                Err(e) => {
                    let mut inner = shared.lock();
                    inner.opening -= 1;
                    shared.publish_gauges(&inner);
                    tracing::warn!(error = %e, "Replacement connect failed");
                }
            }
        });
    }

    fn publish_gauges(&self, inner: &PoolInner) {
        metrics::gauge!("db_pool_idle").set(inner.idle.len() as f64);
        metrics::gauge!("db_pool_leased").set(inner.leased as f64);
        metrics::gauge!("db_pool_waiters").set(inner.waiters.len() as f64);
    }
}

/// Bounded, reusable pool of database connections.
///
/// Cloning is cheap; all clones share one pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                inner: Mutex::new(PoolInner {
                    idle: Vec::new(),
                    waiters: VecDeque::new(),
                    leased: 0,
                    opening: 0,
                    next_id: 0,
                }),
                connector,
                config,
            }),
        }
    }

    /// Acquire a connection, waiting at most `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Acquire {
        self.acquire_until(Instant::now() + timeout)
    }

    /// Acquire a connection, waiting until `deadline` at the latest.
    ///
    /// A deadline already in the past fails on the first poll with
    /// [`CoreError::PoolExhausted`] without entering the waiter queue.
    pub fn acquire_until(&self, deadline: Instant) -> Acquire {
        Acquire {
            shared: self.shared.clone(),
            deadline,
            started: Instant::now(),
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            state: AcquireState::Init,
        }
    }

    /// Pool capacity as configured.
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Current occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        let inner = self.shared.lock();
        PoolStats {
            idle: inner.idle.len(),
            leased: inner.leased,
            waiters: inner.waiters.len(),
            opening: inner.opening,
        }
    }
}

enum AcquireState {
    Init,
    Connecting(BoxFuture<'static, Result<Box<dyn DatabaseConnection>, CoreError>>),
    Waiting(Arc<WaitSlot>),
    Done,
}

/// Future returned by [`ConnectionPool::acquire`].
///
/// Drives the whole acquire protocol: idle reuse, opening a fresh
/// connection when there is headroom, or suspending on the waiter queue.
/// Dropping it at any point (cancellation) cleans up its pool state, and a
/// connection delivered during the race is routed back rather than leaked.
pub struct Acquire {
    shared: Arc<PoolShared>,
    deadline: Instant,
    started: Instant,
    sleep: Pin<Box<Sleep>>,
    state: AcquireState,
}

impl Acquire {
    fn lease(&self, conn: PooledConnection) -> ConnectionLease {
        tracing::debug!(conn_id = conn.id, "Connection leased");
        ConnectionLease::new(self.shared.clone(), conn)
    }

    fn timed_out(&mut self) -> Poll<Result<ConnectionLease, CoreError>> {
        let state = std::mem::replace(&mut self.state, AcquireState::Done);
        match state {
            AcquireState::Waiting(slot) => {
                let mut s = lock_unpoisoned(&slot.state);
                // A delivery that raced the deadline wins; the connection
                // must not be lost.
                if matches!(*s, SlotState::Delivered(_)) {
                    let SlotState::Delivered(conn) =
                        std::mem::replace(&mut *s, SlotState::Cancelled)
                    else {
                        unreachable!()
                    };
                    drop(s);
                    return Poll::Ready(Ok(self.lease(conn)));
                }
                *s = SlotState::Cancelled;
                drop(s);
                let mut inner = self.shared.lock();
                inner.waiters.retain(|w| !Arc::ptr_eq(w, &slot));
                self.shared.publish_gauges(&inner);
            }
            AcquireState::Connecting(_) => {
                // Dropping the connect future cancels it.
                let mut inner = self.shared.lock();
                inner.opening -= 1;
                self.shared.publish_gauges(&inner);
            }
            AcquireState::Init | AcquireState::Done => {}
        }
        let waited_ms = self.started.elapsed().as_millis() as u64;
        Poll::Ready(Err(CoreError::PoolExhausted { waited_ms }))
    }
}

impl Future for Acquire {
    type Output = Result<ConnectionLease, CoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // Deadline is checked on every poll, before any queueing.
        if !matches!(this.state, AcquireState::Done)
            && this.sleep.as_mut().poll(cx).is_ready()
        {
            return this.timed_out();
        }

        loop {
            match &mut this.state {
                AcquireState::Init => {
                    let mut inner = this.shared.lock();
                    if let Some(mut conn) = this.shared.take_idle(&mut inner) {
                        conn.state = ConnState::Leased;
                        inner.leased += 1;
                        this.shared.publish_gauges(&inner);
                        drop(inner);
                        this.state = AcquireState::Done;
                        return Poll::Ready(Ok(this.lease(conn)));
                    }
                    if inner.total() < this.shared.config.capacity {
                        inner.opening += 1;
                        this.shared.publish_gauges(&inner);
                        drop(inner);
                        this.state = AcquireState::Connecting(this.shared.connector.connect());
                        continue;
                    }
                    let slot = WaitSlot::new();
                    inner.waiters.push_back(slot.clone());
                    this.shared.publish_gauges(&inner);
                    drop(inner);
                    this.state = AcquireState::Waiting(slot);
                    continue;
                }
                AcquireState::Connecting(fut) => match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(boxed)) => {
                        let mut inner = this.shared.lock();
                        inner.opening -= 1;
                        inner.leased += 1;
                        let id = inner.next_id;
                        inner.next_id += 1;
                        this.shared.publish_gauges(&inner);
                        drop(inner);
                        this.state = AcquireState::Done;
                        return Poll::Ready(Ok(this.lease(PooledConnection::new_leased(id, boxed))));
                    }
                    Poll::Ready(Err(e)) => {
                        let mut inner = this.shared.lock();
                        inner.opening -= 1;
                        this.shared.publish_gauges(&inner);
                        drop(inner);
                        this.state = AcquireState::Done;
                        return Poll::Ready(Err(e));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                AcquireState::Waiting(slot) => {
                    let mut s = lock_unpoisoned(&slot.state);
                    if matches!(*s, SlotState::Delivered(_)) {
                        let SlotState::Delivered(conn) =
                            std::mem::replace(&mut *s, SlotState::Cancelled)
                        else {
                            unreachable!()
                        };
                        drop(s);
                        this.state = AcquireState::Done;
                        return Poll::Ready(Ok(this.lease(conn)));
                    }
                    *s = SlotState::Waiting(Some(cx.waker().clone()));
                    return Poll::Pending;
                }
                AcquireState::Done => panic!("Acquire polled after completion"),
            }
        }
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, AcquireState::Done);
        match state {
            AcquireState::Waiting(slot) => {
                let mut s = lock_unpoisoned(&slot.state);
                let prev = std::mem::replace(&mut *s, SlotState::Cancelled);
                drop(s);
                if let SlotState::Delivered(conn) = prev {
                    // Cancelled after hand-off: return the connection so it
                    // is not leaked.
                    self.shared.hand_back(conn);
                }
                let mut inner = self.shared.lock();
                inner.waiters.retain(|w| !Arc::ptr_eq(w, &slot));
                self.shared.publish_gauges(&inner);
            }
            AcquireState::Connecting(_) => {
                let mut inner = self.shared.lock();
                inner.opening -= 1;
                self.shared.publish_gauges(&inner);
            }
            AcquireState::Init | AcquireState::Done => {}
        }
    }
}
