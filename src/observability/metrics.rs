//! Metrics exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder and scrape endpoint
//! - Describe the core's well-known metric names
//!
//! # Metrics
//! - `requests_total` (counter): finished requests by status kind
//! - `request_duration_seconds` (histogram): end-to-end latency
//! - `scheduler_in_flight` (gauge): tasks currently running
//! - `db_pool_idle` / `db_pool_leased` / `db_pool_waiters` (gauges)
//! - `observability_events_dropped_total` (counter): sink buffer drops
//!
//! # Design Decisions
//! - Metric updates are atomic operations, cheap enough for the hot path
//! - The recorder is process-global; the core only talks to the facade

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called within a tokio runtime. Failure to install is logged and
/// otherwise ignored; the facade macros become no-ops.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus exporter");
        }
    }
}

fn describe() {
    metrics::describe_counter!("requests_total", "Finished requests by status kind");
    metrics::describe_histogram!(
        "request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    metrics::describe_histogram!("span_duration_seconds", "Closed span durations in seconds");
    metrics::describe_gauge!("scheduler_in_flight", "Tasks currently in flight");
    metrics::describe_gauge!("db_pool_idle", "Idle pooled connections");
    metrics::describe_gauge!("db_pool_leased", "Leased pooled connections");
    metrics::describe_gauge!("db_pool_waiters", "Acquire calls waiting for a connection");
    metrics::describe_counter!(
        "observability_events_dropped_total",
        "Events dropped by the buffered sink"
    );
}
