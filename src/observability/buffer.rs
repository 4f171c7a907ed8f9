//! Bounded fire-and-forget buffering for sink emission.
//!
//! Wraps any sink with a bounded queue drained by a background task. When
//! the queue is full the event is dropped and counted; emission never
//! blocks and never backpressures the request path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::context::ContextCarrier;
use crate::observability::sink::{Event, LogLevel, ObservabilitySink, SpanStatus};

/// Sink wrapper with a bounded queue and background drain task.
pub struct BufferedSink {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl BufferedSink {
    /// Wrap `inner`, draining up to `capacity` queued events.
    ///
    /// Must be called within a tokio runtime; the drain task runs until
    /// the last `BufferedSink` clone is dropped.
    pub fn new(inner: Arc<dyn ObservabilitySink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                forward(&*inner, event);
            }
        });
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            metrics::counter!("observability_events_dropped_total").increment(1);
            if total.is_power_of_two() {
                tracing::warn!(dropped = total, "Observability buffer saturated");
            }
        }
    }
}

impl Clone for BufferedSink {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

fn forward(inner: &dyn ObservabilitySink, event: Event) {
    match event {
        Event::Span {
            carrier,
            name,
            duration,
            status,
        } => inner.emit_span(&carrier, &name, duration, status),
        Event::Metric { name, value, tags } => {
            let refs: Vec<(&str, &str)> =
                tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            inner.emit_metric(&name, value, &refs);
        }
        Event::Log {
            carrier,
            level,
            message,
        } => inner.emit_log(&carrier, level, &message),
    }
}

impl ObservabilitySink for BufferedSink {
    fn emit_span(
        &self,
        carrier: &ContextCarrier,
        name: &str,
        duration: Duration,
        status: SpanStatus,
    ) {
        self.push(Event::Span {
            carrier: carrier.clone(),
            name: name.to_string(),
            duration,
            status,
        });
    }

    fn emit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.push(Event::Metric {
            name: name.to_string(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    fn emit_log(&self, carrier: &ContextCarrier, level: LogLevel, message: &str) {
        self.push(Event::Log {
            carrier: carrier.clone(),
            level,
            message: message.to_string(),
        });
    }
}
