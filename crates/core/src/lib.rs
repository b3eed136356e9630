//! Core types, validation and admission control for the analytics engine.

pub mod analytics;
pub mod error;
pub mod events;
pub mod limits;
pub mod rate_limit;
pub mod task;

pub use analytics::*;
pub use error::{Error, Result};
pub use error::{QueryErrorCode, RateLimitErrorCode, StoreErrorCode, ValidationErrorCode};
pub use events::*;
pub use rate_limit::*;
pub use task::*;
