//! Standardized API responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use engine_core::{TaskId, ValidationErrorCode};
use serde::{Deserialize, Serialize};
use worker::{SubmitReceipt, SubmitStatus};

/// Ingestion acknowledgment.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: SubmitStatus,
    pub queued_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<SubmitReceipt> for IngestResponse {
    fn from(receipt: SubmitReceipt) -> Self {
        let errors: Vec<String> = receipt.rejected.iter().map(|e| e.to_string()).collect();
        Self {
            status: receipt.status,
            queued_events: receipt.queued_events,
            task_id: receipt.task_id,
            rejected: errors.len(),
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_connected: bool,
    pub queue_connected: bool,
    pub queue_depth: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error carrying a stable error code.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
            retry_after: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::BAD_REQUEST,
            ValidationErrorCode::InvalidFormat.code(),
            msg,
        )
    }

    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            response: ErrorResponse::new(msg, "RATE_001"),
            retry_after,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }

    pub fn validation(code: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", code).with_details(errors),
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<engine_core::Error> for ApiError {
    fn from(err: engine_core::Error) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match err {
            engine_core::Error::Validation { code, message, .. } => {
                ApiError::validation(code, vec![message])
            }
            engine_core::Error::QueryPrecondition { code, message, .. } => {
                ApiError::with_code(status, code, message)
            }
            engine_core::Error::RateLimit {
                message,
                retry_after,
                ..
            } => ApiError::rate_limited(message, retry_after),
            engine_core::Error::Store { code, message, .. } => {
                ApiError::with_code(status, code, message)
            }
            engine_core::Error::Queue(_) | engine_core::Error::QueueClosed => {
                ApiError::with_code(status, "QUEUE_001", "task dispatch failed")
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}
