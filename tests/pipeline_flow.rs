//! End-to-end pipeline scenarios: context propagation, backpressure, and
//! cancellation cleanup.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use reactive_core::config::CoreConfig;
use reactive_core::observability::SpanStatus;
use reactive_core::pipeline::{RawRequest, RequestPipeline, Response};
use reactive_core::pool::ConnectionPool;
use reactive_core::Scheduler;

mod common;
use common::{MockConnector, QueryHandler, RecordingSink};

fn build_pipeline(
    config: &CoreConfig,
    connector: MockConnector,
    sink: Arc<RecordingSink>,
) -> (Arc<RequestPipeline>, ConnectionPool) {
    let pool = ConnectionPool::new(config.pool.clone(), Box::new(connector));
    let pipeline = Arc::new(RequestPipeline::new(
        pool.clone(),
        Arc::new(QueryHandler),
        sink,
        config,
    ));
    (pipeline, pool)
}

async fn dispatch_concurrently(
    pipeline: &Arc<RequestPipeline>,
    scheduler: &Arc<Scheduler>,
    requests: Vec<RawRequest>,
) -> Vec<Response> {
    let mut handles = Vec::with_capacity(requests.len());
    for raw in requests {
        let pipeline = pipeline.clone();
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            pipeline.dispatch(&scheduler, raw).await
        }));
    }
    let mut responses = Vec::with_capacity(handles.len());
    for handle in handles {
        responses.push(handle.await.unwrap());
    }
    responses
}

#[tokio::test]
async fn test_trace_id_consistent_across_all_events() {
    let sink = RecordingSink::new();
    let config = CoreConfig::default();
    let (pipeline, _pool) = build_pipeline(&config, MockConnector::new(), sink.clone());

    let raw = RawRequest::get("/orders").with_header(
        "traceparent",
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    );
    let response = pipeline.process(raw).await;
    assert_eq!(response.status, 200);

    // Every span and log of the request shares the inbound trace id.
    let trace_ids = sink.trace_ids();
    assert_eq!(trace_ids.len(), 1);
    assert_eq!(
        trace_ids[0].to_string(),
        "0af7651916cd43dd8448eb211c80319c"
    );

    // The execute span is a child of the request span: same trace,
    // distinct span id, parent link intact.
    let spans = sink.spans();
    let request_span = spans.iter().find(|s| s.name == "request").unwrap();
    let execute_span = spans.iter().find(|s| s.name == "execute").unwrap();
    assert_eq!(execute_span.trace_id, request_span.trace_id);
    assert_ne!(execute_span.span_id, request_span.span_id);
    assert_eq!(execute_span.parent_span_id, Some(request_span.span_id));
    assert_eq!(request_span.status, SpanStatus::Ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_third_request_waits_for_capacity_then_completes() {
    let mut config = CoreConfig::default();
    config.pool.capacity = 2;
    config.pool.acquire_timeout_ms = 5_000;

    let connector = MockConnector::with_execute_delay(Duration::from_millis(100));
    let max_executing = connector.max_executing.clone();
    let sink = RecordingSink::new();
    let (pipeline, pool) = build_pipeline(&config, connector, sink);
    let scheduler = Arc::new(Scheduler::current());

    let requests = (0..3).map(|_| RawRequest::get("/slow")).collect();
    let responses = dispatch_concurrently(&pipeline, &scheduler, requests).await;

    for response in &responses {
        assert_eq!(response.status, 200);
    }
    // Only two connections exist; the third request had to wait its turn.
    assert_eq!(max_executing.load(Ordering::SeqCst), 2);
    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.idle, 2);
}

#[tokio::test]
async fn test_cancelled_mid_execute_still_releases_connection() {
    let mut config = CoreConfig::default();
    config.scheduler.request_deadline_ms = 80;

    let connector = MockConnector::with_execute_delay(Duration::from_secs(30));
    let sink = RecordingSink::new();
    let (pipeline, pool) = build_pipeline(&config, connector, sink.clone());
    let scheduler = Scheduler::current();

    let response = pipeline.dispatch(&scheduler, RawRequest::get("/hang")).await;
    assert_eq!(response.status, 503);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "deadline_exceeded");

    // The task future was dropped on cancellation; its lease guard ran.
    let stats = pool.stats();
    assert_eq!(stats.leased, 0, "cancelled task leaked its lease");
    assert_eq!(scheduler.in_flight(), 0);

    // Cut-short requests still get their terminal observability events.
    let spans = sink.spans();
    let request_span = spans
        .iter()
        .find(|s| s.name == "request")
        .expect("terminal span missing for cancelled request");
    assert_eq!(request_span.status, SpanStatus::Error);
    let metrics = sink.metrics.lock().unwrap();
    assert!(metrics.iter().any(|(name, _, tags)| {
        name == "requests_total"
            && tags
                .iter()
                .any(|(k, v)| k == "status" && v == "deadline_exceeded")
    }));
    let logs = sink.logs.lock().unwrap();
    assert!(logs.iter().any(|(_, _, m)| m.contains("request finished")));
}

#[tokio::test]
async fn test_pool_exhaustion_maps_to_service_unavailable() {
    let mut config = CoreConfig::default();
    config.pool.capacity = 1;
    config.pool.acquire_timeout_ms = 50;

    let sink = RecordingSink::new();
    let (pipeline, pool) = build_pipeline(&config, MockConnector::new(), sink);

    // Hold the only connection outside the pipeline.
    let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

    let response = pipeline.process(RawRequest::get("/busy")).await;
    assert_eq!(response.status, 503);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "pool_exhausted");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let connector = MockConnector::new();
    connector.fail_executes.store(1, Ordering::SeqCst);
    let sink = RecordingSink::new();
    let config = CoreConfig::default();
    let (pipeline, pool) = build_pipeline(&config, connector, sink.clone());

    let response = pipeline.process(RawRequest::get("/flaky")).await;
    assert_eq!(response.status, 502);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "upstream_error");

    // Failure path still released the connection.
    assert_eq!(pool.stats().leased, 0);
    let spans = sink.spans();
    let request_span = spans.iter().find(|s| s.name == "request").unwrap();
    assert_eq!(request_span.status, SpanStatus::Error);
}

#[tokio::test]
async fn test_bad_request_never_touches_the_pool() {
    let connector = MockConnector::new();
    let opened = connector.opened.clone();
    let sink = RecordingSink::new();
    let config = CoreConfig::default();
    let (pipeline, _pool) = build_pipeline(&config, connector, sink);

    let mut raw = RawRequest::get("/x");
    raw.method = "BREW".into();
    let response = pipeline.process(raw).await;
    assert_eq!(response.status, 400);
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_request_gets_exactly_one_response() {
    let mut config = CoreConfig::default();
    config.pool.capacity = 2;
    config.pool.acquire_timeout_ms = 2_000;
    config.scheduler.request_deadline_ms = 5_000;

    let connector = MockConnector::with_execute_delay(Duration::from_millis(20));
    connector.fail_executes.store(5, Ordering::SeqCst);
    let sink = RecordingSink::new();
    let (pipeline, pool) = build_pipeline(&config, connector, sink);
    let scheduler = Arc::new(Scheduler::current());

    let requests = (0..20)
        .map(|i| {
            if i % 7 == 0 {
                let mut bad = RawRequest::get("/x");
                bad.method = "NOPE".into();
                bad
            } else {
                RawRequest::get("/mixed")
            }
        })
        .collect();
    let responses = dispatch_concurrently(&pipeline, &scheduler, requests).await;

    assert_eq!(responses.len(), 20);
    for response in &responses {
        assert!(
            matches!(response.status, 200 | 400 | 502),
            "unexpected status {}",
            response.status
        );
    }
    assert_eq!(pool.stats().leased, 0);
    assert!(scheduler.drain(Duration::from_secs(2)).await);
}
