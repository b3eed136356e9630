//! Event persistence and analytics for the analytics engine.
//!
//! Two backends implement [`EventStore`]: Postgres for production and an
//! in-process map for local runs and tests.

pub mod analytics;
pub mod client;
pub mod config;
pub mod dedup;
mod error;
pub mod health;
pub mod memory;
pub mod schema;
pub mod store;

pub use analytics::{AggregationEngine, AnalyticsConfig};
pub use client::PgEventStore;
pub use config::StoreConfig;
pub use dedup::{BatchDeduplicator, BatchOutcome, PartialBatchError};
pub use memory::MemoryEventStore;
pub use store::{CohortCounts, EventStore};

use engine_core::Result;
use std::sync::Arc;

/// Opens the backend selected by `config.url`.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    if config.is_memory() {
        tracing::info!("Using in-memory event store");
        return Ok(Arc::new(MemoryEventStore::new()));
    }
    Ok(Arc::new(PgEventStore::connect(config).await?))
}
