//! Tests for health, metrics and root endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::setup::TestContext;
use serde_json::Value;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    for field in ["status", "store_connected", "queue_connected", "queue_depth"] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "Unexpected status '{}'",
        status
    );
    assert!(body["queue_depth"].as_u64().is_some());
}

/// Ready follows the store probe
#[tokio::test]
async fn test_ready_after_store_probe() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    assert!(event_store::health::check_connection(ctx.store.as_ref()).await);
    server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server.get("/health/live").await.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["events_received"].as_u64().is_some());
    assert!(body["rows_inserted"].as_u64().is_some());
}

#[tokio::test]
async fn test_root_welcome() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["service"], "analytics-engine");
}
