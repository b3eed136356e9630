//! Event store health probe.

use std::time::Duration;
use telemetry::health;
use tracing::{debug, error};

use crate::store::EventStore;

/// Pings the store and records the outcome in the health registry.
pub async fn check_connection(store: &dyn EventStore) -> bool {
    match store.ping().await {
        Ok(()) => {
            debug!("Event store connection healthy");
            health().store.set_healthy();
            true
        }
        Err(e) => {
            error!(error = %e, "Event store health check failed");
            health().store.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Re-probes the store every `interval` until the task is aborted.
pub async fn monitor(store: std::sync::Arc<dyn EventStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        check_connection(store.as_ref()).await;
    }
}
