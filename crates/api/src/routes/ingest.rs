//! Ingestion endpoint handler.
//!
//! Accepts events in 3 formats:
//! 1. Array: `[event, event, ...]`
//! 2. Object with events: `{ "events": [...] }`
//! 3. Single event: `{ "event_id": "...", ... }`
//!
//! Valid rows are handed to the task queue; persistence happens later on
//! the worker pool.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use engine_core::{limits::MAX_BATCH_SIZE_BYTES, parse_batch, ValidationErrorCode};
use serde::Deserialize;
use tracing::{debug, warn};
use worker::SubmitStatus;

use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /events - Batch ingestion.
///
/// `?dry_run=true` validates and reports without queueing anything.
pub async fn ingest_handler(
    State(state): State<AppState>,
    params: Result<Query<IngestParams>, QueryRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;

    state.coordinator.admit()?;

    // Check payload size before parsing
    if body.len() > MAX_BATCH_SIZE_BYTES {
        warn!(payload_size = body.len(), "Rejected oversized payload");
        return Err(ApiError::validation(
            ValidationErrorCode::BatchTooLarge.code(),
            vec![format!(
                "Payload size {}KB exceeds {}KB limit",
                body.len() / 1024,
                MAX_BATCH_SIZE_BYTES / 1024
            )],
        ));
    }

    debug!(
        payload_size = body.len(),
        dry_run = params.dry_run,
        "Received event batch"
    );

    let batch = parse_batch(&body).map_err(|e| {
        warn!(error = %e, "Failed to parse ingestion payload");
        ApiError::from(e)
    })?;

    let receipt = state.coordinator.dispatch(batch, params.dry_run).await?;

    let status = match (receipt.status, receipt.task_id.is_some()) {
        (SubmitStatus::Queued, true) => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(IngestResponse::from(receipt))))
}
