//! Application state shared across handlers.

use engine_core::{RateLimitConfig, RateLimiter};
use event_store::{AggregationEngine, AnalyticsConfig, EventStore};
use std::sync::Arc;
use task_queue::TaskProducer;
use worker::IngestionCoordinator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Admission and dispatch of ingestion batches
    pub coordinator: IngestionCoordinator,
    /// Read path
    pub analytics: Arc<AggregationEngine>,
}

impl AppState {
    pub fn new(coordinator: IngestionCoordinator, analytics: Arc<AggregationEngine>) -> Self {
        Self {
            coordinator,
            analytics,
        }
    }

    /// Wires a coordinator and engine from their parts.
    pub fn from_parts(
        store: Arc<dyn EventStore>,
        producer: Arc<dyn TaskProducer>,
        rate_limit: RateLimitConfig,
        analytics: &AnalyticsConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(rate_limit));
        Self {
            coordinator: IngestionCoordinator::new(limiter, producer),
            analytics: Arc::new(AggregationEngine::new(store, analytics)),
        }
    }
}
