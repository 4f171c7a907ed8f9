//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use reactive_core::context::{ContextCarrier, SpanId, TraceId};
use reactive_core::error::CoreError;
use reactive_core::observability::{LogLevel, ObservabilitySink, SpanStatus};
use reactive_core::pipeline::Request;
use reactive_core::pool::{ConnectionLease, Connector, DatabaseConnection, Rows};
use reactive_core::{BoxFuture, Handler};

/// Programmable connector: configurable latencies and scripted execute
/// failures, with counters for assertions.
#[derive(Default)]
pub struct MockConnector {
    pub connect_delay: Duration,
    pub execute_delay: Duration,
    /// Each failing execute decrements this; while positive, executes fail.
    pub fail_executes: Arc<AtomicU32>,
    pub opened: Arc<AtomicU32>,
    pub executes: Arc<AtomicU32>,
    /// Concurrently-executing operations, with a high-water mark.
    pub executing: Arc<AtomicUsize>,
    pub max_executing: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execute_delay(execute_delay: Duration) -> Self {
        Self {
            execute_delay,
            ..Self::default()
        }
    }
}

impl Connector for MockConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Box<dyn DatabaseConnection>, CoreError>> {
        let connect_delay = self.connect_delay;
        let conn = MockConnection {
            execute_delay: self.execute_delay,
            fail_executes: self.fail_executes.clone(),
            executes: self.executes.clone(),
            executing: self.executing.clone(),
            max_executing: self.max_executing.clone(),
        };
        let opened = self.opened.clone();
        Box::pin(async move {
            if !connect_delay.is_zero() {
                tokio::time::sleep(connect_delay).await;
            }
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(conn) as Box<dyn DatabaseConnection>)
        })
    }
}

struct MockConnection {
    execute_delay: Duration,
    fail_executes: Arc<AtomicU32>,
    executes: Arc<AtomicU32>,
    executing: Arc<AtomicUsize>,
    max_executing: Arc<AtomicUsize>,
}

impl DatabaseConnection for MockConnection {
    fn execute<'a>(
        &'a mut self,
        query: &'a str,
        _params: &'a [serde_json::Value],
    ) -> BoxFuture<'a, Result<Rows, CoreError>> {
        Box::pin(async move {
            self.executes.fetch_add(1, Ordering::SeqCst);
            let now = self.executing.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_executing.fetch_max(now, Ordering::SeqCst);
            if !self.execute_delay.is_zero() {
                tokio::time::sleep(self.execute_delay).await;
            }
            self.executing.fetch_sub(1, Ordering::SeqCst);

            let remaining = self.fail_executes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_executes.store(remaining - 1, Ordering::SeqCst);
                return Err(CoreError::Upstream("injected failure".into()));
            }
            Ok(Rows {
                rows: vec![json!({ "query": query })],
            })
        })
    }
}

/// Handler that runs one probe query through the lease.
pub struct QueryHandler;

impl Handler for QueryHandler {
    fn handle<'a>(
        &'a self,
        _carrier: &'a ContextCarrier,
        request: &'a Request,
        lease: &'a mut ConnectionLease,
    ) -> BoxFuture<'a, Result<Rows, CoreError>> {
        Box::pin(async move { lease.execute(&request.path, &[]).await })
    }
}

#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub status: SpanStatus,
}

/// Sink that records every emitted event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub spans: Mutex<Vec<RecordedSpan>>,
    pub logs: Mutex<Vec<(TraceId, LogLevel, String)>>,
    pub metrics: Mutex<Vec<(String, f64, Vec<(String, String)>)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn trace_ids(&self) -> Vec<TraceId> {
        let mut ids: Vec<TraceId> = Vec::new();
        let spans = self.spans.lock().unwrap();
        let logs = self.logs.lock().unwrap();
        for id in spans
            .iter()
            .map(|s| s.trace_id)
            .chain(logs.iter().map(|(t, _, _)| *t))
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

impl ObservabilitySink for RecordingSink {
    fn emit_span(
        &self,
        carrier: &ContextCarrier,
        name: &str,
        _duration: Duration,
        status: SpanStatus,
    ) {
        self.spans.lock().unwrap().push(RecordedSpan {
            trace_id: carrier.trace_id(),
            span_id: carrier.span_id(),
            parent_span_id: carrier.parent_span_id(),
            name: name.to_string(),
            status,
        });
    }

    fn emit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.metrics.lock().unwrap().push((
            name.to_string(),
            value,
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
    }

    fn emit_log(&self, carrier: &ContextCarrier, level: LogLevel, message: &str) {
        self.logs
            .lock()
            .unwrap()
            .push((carrier.trace_id(), level, message.to_string()));
    }
}
