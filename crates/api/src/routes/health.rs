//! Health check and service info endpoints.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use telemetry::{health, metrics, MetricsSnapshot};

use crate::response::HealthResponse;

/// GET / - Welcome document.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "analytics-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "message": "Welcome to the Analytics API",
    }))
}

/// GET /health - Full health check.
pub async fn health_handler() -> Json<HealthResponse> {
    let report = health().report();

    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        store_connected: health().store.is_healthy(),
        queue_connected: health().queue.is_healthy(),
        queue_depth: metrics().queue_depth.get(),
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /metrics - In-process counters as JSON.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
