//! Default sink backed by the `tracing` and `metrics` facades.
//!
//! The facades decouple the core from the actual exporters: whatever
//! subscriber/recorder is installed at startup (stdout, Prometheus, a
//! shipper) receives these events. Nothing here can fail a request.

use std::time::Duration;

use metrics::Label;

use crate::context::ContextCarrier;
use crate::observability::sink::{LogLevel, ObservabilitySink, SpanStatus};

/// Forwards spans and logs to `tracing`, metric samples to `metrics`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl ObservabilitySink for TracingSink {
    fn emit_span(
        &self,
        carrier: &ContextCarrier,
        name: &str,
        duration: Duration,
        status: SpanStatus,
    ) {
        match status {
            SpanStatus::Ok => tracing::info!(
                trace_id = %carrier.trace_id(),
                span_id = %carrier.span_id(),
                span = %name,
                duration_ms = duration.as_millis() as u64,
                "Span closed"
            ),
            SpanStatus::Error => tracing::warn!(
                trace_id = %carrier.trace_id(),
                span_id = %carrier.span_id(),
                span = %name,
                duration_ms = duration.as_millis() as u64,
                "Span closed with error"
            ),
        }
        metrics::histogram!(
            "span_duration_seconds",
            "span" => name.to_string(),
            "status" => if status == SpanStatus::Ok { "ok" } else { "error" }
        )
        .record(duration.as_secs_f64());
    }

    fn emit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let labels: Vec<Label> = tags
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect();
        // Suffix convention decides the instrument kind.
        if name.ends_with("_total") {
            metrics::counter!(name.to_string(), labels).increment(value as u64);
        } else if name.ends_with("_seconds") {
            metrics::histogram!(name.to_string(), labels).record(value);
        } else {
            metrics::gauge!(name.to_string(), labels).set(value);
        }
    }

    fn emit_log(&self, carrier: &ContextCarrier, level: LogLevel, message: &str) {
        let trace_id = carrier.trace_id();
        let span_id = carrier.span_id();
        match level {
            LogLevel::Debug => {
                tracing::debug!(trace_id = %trace_id, span_id = %span_id, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(trace_id = %trace_id, span_id = %span_id, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(trace_id = %trace_id, span_id = %span_id, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(trace_id = %trace_id, span_id = %span_id, "{}", message)
            }
        }
    }
}
