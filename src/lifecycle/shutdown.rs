//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::scheduler::Scheduler;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe
/// to, plus a drain step that waits for in-flight pipeline tasks.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger, then wait for the scheduler to drain its in-flight tasks.
    /// Returns true when everything finished before the timeout.
    pub async fn drain(&self, scheduler: &Scheduler, timeout: Duration) -> bool {
        tracing::debug!(
            subscribers = self.receiver_count(),
            "Signalling shutdown to background tasks"
        );
        self.trigger();
        let drained = scheduler.drain(timeout).await;
        if drained {
            tracing::info!("Drain complete");
        }
        drained
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the process shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        // Without a signal handler there is nothing to wait for.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_observe_trigger() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.trigger();
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_signals_background_tasks() {
        let shutdown = Shutdown::new();
        let scheduler = Scheduler::current();

        let mut rx = shutdown.subscribe();
        let background = tokio::spawn(async move { rx.recv().await.is_ok() });

        assert!(shutdown.drain(&scheduler, Duration::from_secs(1)).await);
        assert!(background.await.unwrap());
    }
}
