//! Service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │            REQUEST-PROCESSING CORE            │
//!                    │                                               │
//!  Inbound request   │  ┌──────────┐   ┌───────────┐   ┌─────────┐  │
//!  ──────────────────┼─▶│ pipeline │──▶│ scheduler │──▶│  pool   │──┼──▶ Database
//!                    │  │  decode  │   │ run-loops │   │ acquire │  │    (external)
//!                    │  └────┬─────┘   └───────────┘   └────┬────┘  │
//!                    │       │  ContextCarrier (explicit)    │       │
//!  Response          │  ┌────▼─────────────────────────▼────────┐   │
//!  ◀─────────────────┼──│ encode + terminal span/metric/log     │   │
//!                    │  └───────────────────────────────────────┘   │
//!                    │                                               │
//!                    │  Cross-cutting: config · lifecycle ·          │
//!                    │  observability sinks · error taxonomy         │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! All components are built and wired here via plain constructors; nothing
//! is discovered at runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reactive_core::config::{load_config, CoreConfig};
use reactive_core::context::ContextCarrier;
use reactive_core::lifecycle::{shutdown_signal, Shutdown};
use reactive_core::observability::{metrics, BufferedSink, TracingSink};
use reactive_core::pipeline::{RawRequest, Request, RequestPipeline};
use reactive_core::pool::{ConnectionLease, ConnectionPool, InMemoryConnector, Rows};
use reactive_core::{BoxFuture, CoreError, Handler, Scheduler};

/// Placeholder operation until a real driver/handler pair is wired in:
/// runs a probe query on the leased connection.
struct SelfCheckHandler;

impl Handler for SelfCheckHandler {
    fn handle<'a>(
        &'a self,
        _carrier: &'a ContextCarrier,
        request: &'a Request,
        lease: &'a mut ConnectionLease,
    ) -> BoxFuture<'a, Result<Rows, CoreError>> {
        Box::pin(async move {
            lease
                .execute("SELECT 1", &[serde_json::Value::String(request.path.clone())])
                .await
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reactive_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("reactive-core v0.1.0 starting");

    let config = match std::env::var("REACTIVE_CORE_CONFIG") {
        Ok(path) => load_config(Path::new(&path))?,
        Err(_) => CoreConfig::default(),
    };

    tracing::info!(
        pool_capacity = config.pool.capacity,
        acquire_timeout_ms = config.pool.acquire_timeout_ms,
        request_deadline_ms = config.scheduler.request_deadline_ms,
        workers = config.scheduler.resolved_workers(),
        "Configuration loaded"
    );

    let scheduler = Scheduler::new(&config.scheduler)?;
    let drain_timeout = config.scheduler.drain_timeout();

    scheduler.block_on(async {
        if config.observability.metrics_enabled {
            if let Ok(addr) = config.observability.metrics_address.parse() {
                metrics::init_metrics(addr);
            } else {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }

        let sink = Arc::new(BufferedSink::new(
            Arc::new(TracingSink::new()),
            config.observability.sink_buffer,
        ));
        let pool = ConnectionPool::new(config.pool.clone(), Box::new(InMemoryConnector::new()));
        let pipeline = Arc::new(RequestPipeline::new(
            pool.clone(),
            Arc::new(SelfCheckHandler),
            sink,
            &config,
        ));

        // Startup self-check: one request through the full pipeline.
        let response = pipeline.dispatch(&scheduler, RawRequest::get("/health")).await;
        tracing::info!(status = response.status, "Startup self-check finished");

        let shutdown = Shutdown::new();

        // Periodic pool occupancy report; stops on the shutdown broadcast.
        let mut report_shutdown = shutdown.subscribe();
        let report_pool = pool.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let stats = report_pool.stats();
                        tracing::info!(
                            idle = stats.idle,
                            leased = stats.leased,
                            waiters = stats.waiters,
                            "Pool occupancy"
                        );
                    }
                    _ = report_shutdown.recv() => break,
                }
            }
        });

        tracing::info!("Core ready; transport adapters may now submit requests");

        shutdown_signal().await;
        shutdown.drain(&scheduler, drain_timeout).await;
    })?;

    tracing::info!("Shutdown complete");
    Ok(())
}
