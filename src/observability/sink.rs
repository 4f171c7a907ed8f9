//! Sink adapter contract.
//!
//! The pipeline emits spans, metric samples, and log lines through this
//! interface. Implementations must never block the caller and must never
//! propagate export failures back to the request.

use std::time::Duration;

use crate::context::ContextCarrier;

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Log severities the pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Fire-and-forget observability adapter.
///
/// Calls must be cheap; implementations buffer or drop when the backing
/// exporter is unavailable.
pub trait ObservabilitySink: Send + Sync + 'static {
    /// Record a closed span tagged with the carrier's identifiers.
    fn emit_span(
        &self,
        carrier: &ContextCarrier,
        name: &str,
        duration: Duration,
        status: SpanStatus,
    );

    /// Record one metric sample.
    fn emit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]);

    /// Record a log line correlated to the carrier's trace.
    fn emit_log(&self, carrier: &ContextCarrier, level: LogLevel, message: &str);
}

/// An emitted event, used by buffering sinks to carry calls across the
/// queue boundary.
#[derive(Debug, Clone)]
pub enum Event {
    Span {
        carrier: ContextCarrier,
        name: String,
        duration: Duration,
        status: SpanStatus,
    },
    Metric {
        name: String,
        value: f64,
        tags: Vec<(String, String)>,
    },
    Log {
        carrier: ContextCarrier,
        level: LogLevel,
        message: String,
    },
}
