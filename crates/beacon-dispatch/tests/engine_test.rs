//! Integration tests for the dispatch engine against a live HTTP endpoint.
//!
//! Covers request construction on the wire, response classification, worker
//! survival after failures and the shutdown contract.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use anyhow::Result;
use beacon_dispatch::{DispatchConfig, DispatchEngine, DispatchError, LogEvent, WorkerState};
use beacon_testing::{
    fixtures::numbered_events, tcp::wait_for_eof, wait_for, LogEventBuilder, MockServer,
    RawEndpoint,
};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn engine(queue_capacity: usize, worker_count: usize) -> DispatchEngine {
    DispatchEngine::new(DispatchConfig::new(queue_capacity, worker_count))
        .expect("engine should build")
}

#[tokio::test]
async fn get_event_carries_params_as_query_string() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_status("/v1/events", 200).await;
    let engine = engine(10, 1);

    engine.dispatch(
        LogEventBuilder::get(server.endpoint_url("/v1/events"))
            .param("a", "1")
            .param("b", "2")
            .build(),
    );

    let requests = server.wait_for_requests(1, WAIT).await?;
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].query.as_deref(), Some("a=1&b=2"));
    assert!(requests[0].body.is_empty());

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn post_event_carries_body_with_json_content_type() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_method("POST", "/v1/events", 204).await;
    let engine = engine(10, 1);

    engine.dispatch(LogEvent::post(server.endpoint_url("/v1/events"), r#"{"x":1}"#));

    let requests = server.wait_for_requests(1, WAIT).await?;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body_text(), r#"{"x":1}"#);
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    assert!(requests[0].header("cookie").is_none());

    wait_for(|| engine.stats().successful_deliveries == 1, WAIT).await?;
    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn post_json_body_arrives_unchanged() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_method("POST", "/v1/events", 200).await;
    server.mock_method("POST", "/v1/raw", 200).await;
    let engine = engine(10, 1);
    let payload = json!({ "account_id": "42", "visitors": [{ "visitor_id": "v1" }] });

    engine.dispatch(
        LogEventBuilder::post(server.endpoint_url("/v1/events")).json_body(&payload).build(),
    );
    engine.dispatch(LogEventBuilder::post(server.endpoint_url("/v1/raw")).body("not json").build());

    server.wait_for_requests(2, WAIT).await?;

    let json_requests = server.requests_to("/v1/events").await;
    assert_eq!(json_requests.len(), 1);
    assert_eq!(json_requests[0].body_json()?, payload);

    let raw_requests = server.requests_to("/v1/raw").await;
    assert_eq!(raw_requests[0].body_text(), "not json");
    assert!(raw_requests[0].body_json().is_err());

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn protocol_error_is_recorded_and_worker_moves_on() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_sequence("/v1/events", &[500, 204]).await;
    let engine = engine(10, 1);

    engine.dispatch(LogEvent::get(server.endpoint_url("/v1/events")));
    engine.dispatch(LogEvent::get(server.endpoint_url("/v1/events")));

    server.wait_for_requests(2, WAIT).await?;
    wait_for(|| engine.stats().completed() == 2, WAIT).await?;

    let stats = engine.stats();
    assert_eq!(stats.protocol_errors, 1);
    assert_eq!(stats.successful_deliveries, 1);
    assert_eq!(stats.transport_errors, 0);
    wait_for(|| engine.worker_states() == vec![WorkerState::Waiting], WAIT).await?;

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn malformed_endpoint_does_not_kill_worker() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_status("/v1/events", 200).await;
    let engine = engine(10, 1);

    engine.dispatch(LogEvent::get("test_url"));
    engine.dispatch(LogEvent::get(server.endpoint_url("/v1/events")));

    server.wait_for_requests(1, WAIT).await?;
    wait_for(|| engine.stats().completed() == 2, WAIT).await?;

    let stats = engine.stats();
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.successful_deliveries, 1);
    assert_eq!(stats.active_workers, 1);

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_status("/v1/events", 200).await;
    let engine = DispatchEngine::new(
        DispatchConfig::builder()
            .queue_capacity(10)
            .worker_count(1)
            .connect_timeout(Duration::from_millis(500))
            .request_timeout(Duration::from_secs(1))
            .build(),
    )?;

    engine.dispatch(LogEvent::get("http://127.0.0.1:9/v1/events"));
    engine.dispatch(LogEvent::get(server.endpoint_url("/v1/events")));

    server.wait_for_requests(1, WAIT).await?;
    wait_for(|| engine.stats().completed() == 2, WAIT).await?;
    assert_eq!(engine.stats().transport_errors, 1);

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn slow_endpoint_times_out() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_delayed("/slow", 200, Duration::from_secs(3)).await;
    let engine = DispatchEngine::new(
        DispatchConfig::builder()
            .queue_capacity(10)
            .worker_count(1)
            .request_timeout(Duration::from_millis(200))
            .build(),
    )?;

    engine.dispatch(LogEvent::get(server.endpoint_url("/slow")));

    wait_for(|| engine.stats().transport_errors == 1, WAIT).await?;
    assert_eq!(engine.stats().successful_deliveries, 0);

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn zero_capacity_fails_construction() {
    let result = DispatchEngine::new(DispatchConfig::new(0, 2));

    match result {
        Err(error @ DispatchError::InvalidQueueCapacity { .. }) => assert!(error.is_fatal()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("zero capacity must be rejected"),
    }
}

#[tokio::test]
async fn every_event_delivered_once_across_workers() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_status("/v1/events", 200).await;
    let engine = engine(100, 4);

    for event in numbered_events(&server.endpoint_url("/v1/events"), 50) {
        engine.dispatch(event);
    }

    server.wait_for_requests(50, WAIT).await?;
    wait_for(|| engine.stats().completed() == 50, WAIT).await?;

    let mut seqs: Vec<usize> = server
        .received_requests()
        .await
        .iter()
        .map(|r| r.query_pairs[0].1.parse().unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..50).collect::<Vec<_>>());

    engine.shutdown();
    Ok(())
}

#[tokio::test]
async fn no_dispatch_after_shutdown() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_status("/v1/events", 200).await;
    let engine = engine(10, 1);

    engine.shutdown();
    engine.dispatch(LogEvent::get(server.endpoint_url("/v1/events")));

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.assert_request_count(0).await;
    assert_eq!(engine.stats().events_dropped, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_shutdown_is_harmless() {
    let engine = engine(10, 2);

    engine.shutdown();
    engine.shutdown();

    assert!(engine.is_shut_down());
}

#[tokio::test]
async fn shutdown_closes_idle_pooled_connections() -> Result<()> {
    let endpoint = RawEndpoint::bind().await?;
    let url = endpoint.endpoint_url("/v1/events");
    let server = tokio::spawn(endpoint.serve_one());
    let engine = engine(10, 1);

    engine.dispatch(LogEvent::get(url));

    let mut socket = server.await??;
    wait_for(|| engine.stats().successful_deliveries == 1, WAIT).await?;

    engine.shutdown();

    wait_for_eof(&mut socket, Duration::from_secs(2)).await
}

#[tokio::test]
async fn workers_terminate_on_shutdown() -> Result<()> {
    let engine = engine(10, 3);

    engine.shutdown();

    wait_for(|| engine.worker_states().iter().all(|s| *s == WorkerState::Terminated), WAIT)
        .await?;
    wait_for(|| engine.stats().active_workers == 0, WAIT).await?;
    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_drains_queue() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_delayed("/v1/events", 200, Duration::from_millis(20)).await;
    let engine = engine(100, 2);

    for event in numbered_events(&server.endpoint_url("/v1/events"), 20) {
        engine.dispatch(event);
    }

    let undelivered = engine.shutdown_graceful(WAIT).await;

    assert_eq!(undelivered, 0);
    server.assert_request_count(20).await;
    assert_eq!(engine.stats().successful_deliveries, 20);
    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_reports_leftovers_on_timeout() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_delayed("/v1/events", 200, Duration::from_secs(2)).await;
    let engine = engine(100, 1);

    for event in numbered_events(&server.endpoint_url("/v1/events"), 5) {
        engine.dispatch(event);
    }

    let undelivered = engine.shutdown_graceful(Duration::from_millis(200)).await;

    assert_eq!(undelivered, 5);
    assert_eq!(engine.stats().successful_deliveries, 0);
    Ok(())
}
