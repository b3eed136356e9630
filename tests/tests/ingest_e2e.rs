//! End-to-end tests for the ingest pipeline.
//!
//! POST /events → ChannelQueue → IngestWorker → event store
//!
//! These run against the in-memory store; `postgres_store.rs` repeats the
//! persistence checks against a real database.

use axum::http::StatusCode;
use axum_test::TestServer;
use engine_core::RateLimitConfig;
use integration_tests::{
    fixtures,
    setup::{TestContext, TestOptions},
};
use serde_json::Value;

async fn post(server: &TestServer, path: &str, payload: String) -> axum_test::TestResponse {
    server
        .post(path)
        .content_type("application/json")
        .bytes(payload.into())
        .await
}

/// Full pipeline: POST /events (array format) → queue → store
#[tokio::test]
async fn test_ingest_array_format_e2e() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = post(&server, "/events", fixtures::array_payload(fixtures::events(5))).await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "queued");
    assert_eq!(body["queued_events"], 5);
    assert_eq!(body["rejected"], 0);
    assert!(body["task_id"].is_string());
    assert!(body.get("errors").is_none());

    // Nothing is persisted until a worker runs
    assert_eq!(ctx.stored_events().await, 0);
    assert_eq!(ctx.drain().await.unwrap(), 1);
    assert_eq!(ctx.stored_events().await, 5);
}

#[tokio::test]
async fn test_ingest_object_and_single_formats() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    post(&server, "/events", fixtures::object_payload(fixtures::events(3)))
        .await
        .assert_status(StatusCode::ACCEPTED);
    post(
        &server,
        "/events/",
        fixtures::single_payload(fixtures::event("u1", "login", "2024-03-01T08:00:00Z")),
    )
    .await
    .assert_status(StatusCode::ACCEPTED);

    ctx.drain().await.unwrap();
    assert_eq!(ctx.stored_events().await, 4);
}

/// Re-sending the same batch must not create extra rows
#[tokio::test]
async fn test_duplicate_submission_is_idempotent() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let payload = fixtures::array_payload(fixtures::events(250));

    post(&server, "/events", payload.clone()).await.assert_status(StatusCode::ACCEPTED);
    post(&server, "/events", payload).await.assert_status(StatusCode::ACCEPTED);

    assert_eq!(ctx.drain().await.unwrap(), 2);
    assert_eq!(ctx.stored_events().await, 250);
}

/// Valid rows are queued while invalid ones are reported by index
#[tokio::test]
async fn test_partial_rejection_reports_row_errors() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let mut events = fixtures::events(2);
    events.insert(1, fixtures::event("", "login", "2024-03-01T08:00:00Z"));
    events.push(fixtures::event("u9", "login", "not a timestamp"));

    let response = post(&server, "/events", fixtures::array_payload(events)).await;
    response.assert_status(StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert_eq!(body["queued_events"], 2);
    assert_eq!(body["rejected"], 2);
    let errors = body["errors"].as_array().unwrap();
    assert!(errors[0].as_str().unwrap().starts_with("event[1].user_id"));
    assert!(errors[1].as_str().unwrap().starts_with("event[3].occurred_at"));

    ctx.drain().await.unwrap();
    assert_eq!(ctx.stored_events().await, 2);
}

#[tokio::test]
async fn test_all_rows_rejected_dispatches_nothing() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let payload = fixtures::array_payload(vec![fixtures::event("u1", "", "2024-03-01")]);
    let response = post(&server, "/events", payload).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["queued_events"], 0);
    assert!(body.get("task_id").is_none());
    assert_eq!(ctx.queue.depth(), 0);
}

#[tokio::test]
async fn test_dry_run_persists_nothing() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = post(
        &server,
        "/events?dry_run=true",
        fixtures::array_payload(fixtures::events(4)),
    )
    .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "dry_run");
    assert_eq!(body["queued_events"], 4);
    assert_eq!(ctx.queue.depth(), 0);
    assert_eq!(ctx.stored_events().await, 0);
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = post(&server, "/events", "{not json".to_string()).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = post(&server, "/events", fixtures::array_payload(fixtures::events(1001))).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_002");
    assert_eq!(ctx.queue.depth(), 0);
}

/// One token per request regardless of batch size
#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let ctx = TestContext::with_options(TestOptions {
        rate_limit: RateLimitConfig {
            capacity: 2,
            refill_per_sec: 0.01,
        },
        ..TestOptions::default()
    })
    .await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    for _ in 0..2 {
        post(&server, "/events", fixtures::array_payload(fixtures::events(50)))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let response = post(&server, "/events", fixtures::array_payload(fixtures::events(1))).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["code"], "RATE_001");
    let retry_after: u64 = response
        .header("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    // The rejected request dispatched nothing
    ctx.drain().await.unwrap();
    assert_eq!(ctx.stored_events().await, 100);
}

#[tokio::test]
async fn test_dispatch_failure_is_unavailable() {
    let (router, producer) = TestContext::with_mock_producer();
    let server = TestServer::new(router).expect("Failed to create test server");
    producer.set_should_fail(true);

    let response = post(&server, "/events", fixtures::array_payload(fixtures::events(3))).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["code"], "QUEUE_001");
    assert_eq!(producer.event_count(), 0);
}

#[tokio::test]
async fn test_dispatched_task_carries_valid_events() {
    let (router, producer) = TestContext::with_mock_producer();
    let server = TestServer::new(router).expect("Failed to create test server");

    let response = post(&server, "/events", fixtures::array_payload(fixtures::events(3))).await;
    response.assert_status(StatusCode::ACCEPTED);

    let body: Value = response.json();
    let tasks = producer.captured_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].len(), 3);
    assert_eq!(body["task_id"], tasks[0].task_id.to_string());
}

#[tokio::test]
async fn test_responses_carry_process_time() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/").await;
    response.assert_status_ok();
    let elapsed: f64 = response
        .header("x-process-time")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(elapsed >= 0.0);
}
