//! API routes.

pub mod health;
pub mod ingest;
pub mod stats;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use engine_core::limits::MAX_BATCH_SIZE_BYTES;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware::timing::process_time;
use crate::state::AppState;

/// Bodies up to this size reach the handler, which answers oversized
/// batches with a coded error; larger ones get a bare 413.
const BODY_LIMIT_BYTES: usize = MAX_BATCH_SIZE_BYTES * 2;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::root_handler))
        .route("/events", post(ingest::ingest_handler))
        .route("/events/", post(ingest::ingest_handler))
        .route("/stats/dau", get(stats::dau_handler))
        .route("/stats/top-events", get(stats::top_events_handler))
        .route("/stats/retention", get(stats::retention_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn(process_time))
                .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES)),
        )
        .layer(cors)
        .with_state(state)
}
