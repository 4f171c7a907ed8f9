//! Pipeline orchestration.
//!
//! One `process` call drives a request through the stage machine. The
//! handler seam is where business/data-access logic plugs in; it receives
//! the carrier explicitly, never through ambient state.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CoreConfig;
use crate::context::ContextCarrier;
use crate::error::CoreError;
use crate::observability::{LogLevel, ObservabilitySink, SpanStatus};
use crate::pipeline::request::{decode, RawRequest, Request};
use crate::pipeline::response::Response;
use crate::pipeline::stage::Stage;
use crate::pool::{ConnectionLease, ConnectionPool, Rows};
use crate::scheduler::Scheduler;
use crate::BoxFuture;

/// The operation executed with a leased connection.
///
/// Implementations receive the request's derived child carrier so every
/// event they emit correlates to the request trace.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        carrier: &'a ContextCarrier,
        request: &'a Request,
        lease: &'a mut ConnectionLease,
    ) -> BoxFuture<'a, Result<Rows, CoreError>>;
}

/// Orchestrates decode → context → acquire → execute → encode for each
/// request, with guaranteed release and exactly one response.
pub struct RequestPipeline {
    pool: ConnectionPool,
    handler: Arc<dyn Handler>,
    sink: Arc<dyn ObservabilitySink>,
    request_deadline: Duration,
    acquire_timeout: Duration,
}

impl RequestPipeline {
    pub fn new(
        pool: ConnectionPool,
        handler: Arc<dyn Handler>,
        sink: Arc<dyn ObservabilitySink>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            pool,
            handler,
            sink,
            request_deadline: config.scheduler.request_deadline(),
            acquire_timeout: config.pool.acquire_timeout(),
        }
    }

    /// Process one request to its terminal state.
    ///
    /// Never returns an error: every outcome, timeout and fault included,
    /// is an encoded response. Terminal observability events are emitted
    /// before returning.
    pub async fn process(&self, raw: RawRequest) -> Response {
        // Extraction is infallible: malformed identifiers fall back to a
        // fresh trace rather than failing the request.
        let carrier = ContextCarrier::extract(
            raw.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        self.process_with(raw, carrier, Instant::now()).await
    }

    async fn process_with(
        &self,
        raw: RawRequest,
        carrier: ContextCarrier,
        started: Instant,
    ) -> Response {
        let deadline = started + self.request_deadline;
        self.sink.emit_log(
            &carrier,
            LogLevel::Debug,
            &format!("request received: {} {}", raw.method, raw.path),
        );

        let mut stage = Stage::Decoding;
        let mut result = self.run(raw, &carrier, deadline, &mut stage).await;

        stage = Stage::Encoding;
        // A success that lands past the deadline is still a timeout.
        if result.is_ok() {
            if let Err(e) = check_deadline(deadline) {
                result = Err(e);
            }
        }
        tracing::trace!(stage = %stage, "Encoding response");
        let response = match &result {
            Ok(rows) => Response::ok(rows),
            Err(e) => Response::from_error(e),
        };
        stage = if result.is_ok() { Stage::Done } else { Stage::Failed };

        self.finish(&carrier, started, stage, &result);
        response
    }

    /// Spawn `process` on the scheduler with the per-request deadline.
    ///
    /// Cooperative cancellation (deadline expiry mid-stage) unwinds the
    /// task, releases any held lease, and still yields an encoded response.
    /// The terminal span/metric/log are emitted here when the task was cut
    /// short before reaching its own terminal state.
    pub async fn dispatch(self: &Arc<Self>, scheduler: &Scheduler, raw: RawRequest) -> Response {
        let started = Instant::now();
        let deadline = started + self.request_deadline;
        let carrier = ContextCarrier::extract(
            raw.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let pipeline = self.clone();
        let task_carrier = carrier.clone();
        let handle = scheduler.spawn(
            async move { Ok(pipeline.process_with(raw, task_carrier, started).await) },
            Some(deadline),
        );
        match handle.join().await {
            Ok(response) => response,
            Err(e) => {
                // The task future was dropped mid-stage; it never emitted
                // its terminal events, so they are emitted on its behalf.
                let response = Response::from_error(&e);
                self.finish(&carrier, started, Stage::Failed, &Err(e));
                response
            }
        }
    }

    async fn run(
        &self,
        raw: RawRequest,
        carrier: &ContextCarrier,
        deadline: Instant,
        stage: &mut Stage,
    ) -> Result<Rows, CoreError> {
        // decoding
        let request = decode(raw)?;

        // awaiting_connection
        check_deadline(deadline)?;
        *stage = Stage::AwaitingConnection;
        let acquire_deadline = cmp::min(deadline, Instant::now() + self.acquire_timeout);
        let mut lease = self.pool.acquire_until(acquire_deadline).await?;

        // executing
        check_deadline(deadline)?;
        *stage = Stage::Executing;
        let op_carrier = carrier.derive_child();
        let op_started = Instant::now();
        let result = self.handler.handle(&op_carrier, &request, &mut lease).await;
        let op_status = if result.is_ok() {
            SpanStatus::Ok
        } else {
            SpanStatus::Error
        };
        self.sink
            .emit_span(&op_carrier, "execute", op_started.elapsed(), op_status);
        // Release happens here on success and failure alike; cancellation
        // mid-await drops the lease the same way.
        drop(lease);

        result.map_err(|e| match e {
            CoreError::DeadlineExceeded | CoreError::Upstream(_) => e,
            other => CoreError::Upstream(other.to_string()),
        })
    }

    fn finish(
        &self,
        carrier: &ContextCarrier,
        started: Instant,
        stage: Stage,
        result: &Result<Rows, CoreError>,
    ) {
        let duration = started.elapsed();
        let (status, kind) = match result {
            Ok(_) => (SpanStatus::Ok, "ok"),
            Err(e) => (SpanStatus::Error, e.kind()),
        };
        self.sink.emit_span(carrier, "request", duration, status);
        self.sink.emit_metric(
            "request_duration_seconds",
            duration.as_secs_f64(),
            &[("status", kind)],
        );
        self.sink
            .emit_metric("requests_total", 1.0, &[("status", kind)]);
        let level = match result {
            Ok(_) => LogLevel::Info,
            Err(CoreError::Internal(_)) => LogLevel::Error,
            Err(_) => LogLevel::Warn,
        };
        self.sink.emit_log(
            carrier,
            level,
            &format!(
                "request finished: stage={} status={} duration_ms={}",
                stage,
                kind,
                duration.as_millis()
            ),
        );
    }
}

fn check_deadline(deadline: Instant) -> Result<(), CoreError> {
    if Instant::now() >= deadline {
        Err(CoreError::DeadlineExceeded)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::TracingSink;
    use crate::pool::InMemoryConnector;
    use serde_json::json;

    struct EchoHandler;

    impl Handler for EchoHandler {
        fn handle<'a>(
            &'a self,
            _carrier: &'a ContextCarrier,
            request: &'a Request,
            lease: &'a mut ConnectionLease,
        ) -> BoxFuture<'a, Result<Rows, CoreError>> {
            Box::pin(async move {
                lease
                    .execute("SELECT 1", &[json!(request.path.clone())])
                    .await
            })
        }
    }

    fn pipeline() -> RequestPipeline {
        let config = CoreConfig::default();
        let pool = ConnectionPool::new(config.pool.clone(), Box::new(InMemoryConnector::new()));
        RequestPipeline::new(
            pool,
            Arc::new(EchoHandler),
            Arc::new(TracingSink::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_process_success() {
        let response = pipeline().process(RawRequest::get("/users")).await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_process_bad_request() {
        let mut raw = RawRequest::get("/x");
        raw.method = "BREW".into();
        let response = pipeline().process(raw).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_late_success_past_deadline_maps_to_timeout() {
        let mut config = CoreConfig::default();
        config.scheduler.request_deadline_ms = 20;
        let pool = ConnectionPool::new(
            config.pool.clone(),
            Box::new(InMemoryConnector::with_delays(
                Duration::ZERO,
                Duration::from_millis(80),
            )),
        );
        let pipeline = RequestPipeline::new(
            pool,
            Arc::new(EchoHandler),
            Arc::new(TracingSink::new()),
            &config,
        );

        // The handler finishes after the deadline; the result is encoded
        // as a timeout, not a success.
        let response = pipeline.process(RawRequest::get("/slow")).await;
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_lease_released_after_process() {
        let p = pipeline();
        let _ = p.process(RawRequest::get("/a")).await;
        let stats = p.pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 1);
    }
}
