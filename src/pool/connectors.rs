//! Default connector implementations.
//!
//! Real database drivers live behind the [`Connector`] seam and are wired
//! in at startup. The in-memory connector here backs the service binary's
//! self-check and the test suites.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::error::CoreError;
use crate::pool::connection::{Connector, DatabaseConnection, Rows};
use crate::BoxFuture;

/// Connector that fabricates connections in memory, echoing queries back
/// as rows. Optional artificial delays model connect and execute latency.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    connect_delay: Duration,
    execute_delay: Duration,
    opened: Arc<AtomicU64>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(connect_delay: Duration, execute_delay: Duration) -> Self {
        Self {
            connect_delay,
            execute_delay,
            opened: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of connections opened so far.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Box<dyn DatabaseConnection>, CoreError>> {
        let connect_delay = self.connect_delay;
        let execute_delay = self.execute_delay;
        let opened = self.opened.clone();
        Box::pin(async move {
            if !connect_delay.is_zero() {
                tokio::time::sleep(connect_delay).await;
            }
            opened.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(InMemoryConnection { execute_delay }) as Box<dyn DatabaseConnection>)
        })
    }
}

struct InMemoryConnection {
    execute_delay: Duration,
}

impl DatabaseConnection for InMemoryConnection {
    fn execute<'a>(
        &'a mut self,
        query: &'a str,
        params: &'a [serde_json::Value],
    ) -> BoxFuture<'a, Result<Rows, CoreError>> {
        Box::pin(async move {
            if !self.execute_delay.is_zero() {
                tokio::time::sleep(self.execute_delay).await;
            }
            Ok(Rows {
                rows: vec![json!({ "query": query, "params": params })],
            })
        })
    }
}
