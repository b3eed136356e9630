//! Unified error types for the analytics engine.
//!
//! Error codes:
//! - VALID_001-003: Ingestion payload / row validation
//! - QUERY_001-004: Analytics preconditions
//! - RATE_001: Admission rejected
//! - STORE_001-002: Event store failures
//! - QUEUE_001: Task dispatch failures

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Invalid JSON / invalid payload shape
    InvalidFormat,
    /// VALID_002: Batch exceeds event count or byte limit
    BatchTooLarge,
    /// VALID_003: A single event row failed validation
    InvalidEvent,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::BatchTooLarge => "VALID_002",
            Self::InvalidEvent => "VALID_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Analytics precondition error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// QUERY_001: from_date is after to_date
    InvalidRange,
    /// QUERY_002: limit outside 1..=MAX
    InvalidLimit,
    /// QUERY_003: windows outside 1..=MAX
    InvalidWindows,
    /// QUERY_004: date parameter could not be parsed
    InvalidDate,
}

impl QueryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRange => "QUERY_001",
            Self::InvalidLimit => "QUERY_002",
            Self::InvalidWindows => "QUERY_003",
            Self::InvalidDate => "QUERY_004",
        }
    }

    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Event store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Store unreachable (connection / pool / io)
    Unavailable,
    /// STORE_002: Statement failed inside the store
    QueryFailed,
}

impl StoreErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
            Self::QueryFailed => "STORE_002",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unavailable => 503,
            Self::QueryFailed => 500,
        }
    }
}

/// Rate limit error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitErrorCode {
    /// RATE_001: Rate limit exceeded
    Exceeded,
}

impl RateLimitErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exceeded => "RATE_001",
        }
    }

    pub fn http_status(&self) -> u16 {
        429
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Ingestion payload / row validation failure.
    #[error("[{code}] {message}")]
    Validation {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Analytics precondition failure, raised before any query runs.
    #[error("[{code}] {message}")]
    QueryPrecondition {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Admission rejected by the rate limiter.
    #[error("[{code}] {message}")]
    RateLimit {
        code: &'static str,
        message: String,
        http_status: u16,
        retry_after: Option<u64>,
    },

    /// Event store failure.
    #[error("[{code}] {message}")]
    Store {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("[QUEUE_001] task dispatch failed: {0}")]
    Queue(String),

    #[error("task queue closed")]
    QueueClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with code.
    pub fn validation(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create an analytics precondition error.
    pub fn query(code: QueryErrorCode, msg: impl Into<String>) -> Self {
        Self::QueryPrecondition {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a rate limit error.
    pub fn rate_limit(
        code: RateLimitErrorCode,
        msg: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        Self::RateLimit {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
            retry_after,
        }
    }

    /// Create a store error.
    pub fn store(code: StoreErrorCode, msg: impl Into<String>) -> Self {
        Self::Store {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { http_status, .. } => *http_status,
            Self::QueryPrecondition { http_status, .. } => *http_status,
            Self::RateLimit { http_status, .. } => *http_status,
            Self::Store { http_status, .. } => *http_status,
            Self::Queue(_) => 503,
            Self::QueueClosed => 503,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Validation { code, .. } => Some(code),
            Self::QueryPrecondition { code, .. } => Some(code),
            Self::RateLimit { code, .. } => Some(code),
            Self::Store { code, .. } => Some(code),
            Self::Queue(_) | Self::QueueClosed => Some("QUEUE_001"),
            _ => None,
        }
    }

    /// Whether the error means the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store { code, .. } if *code == StoreErrorCode::Unavailable.code())
    }
}
