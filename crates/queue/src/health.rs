//! Task queue health checks.

use telemetry::health;
use tracing::{debug, error};

use crate::config::RedpandaConfig;
use crate::connection;
use crate::producer::TaskProducer;

/// Lists topics to verify the brokers answer and the task topic exists.
pub async fn check_redpanda(config: &RedpandaConfig) -> Result<(), String> {
    let client = connection::connect(config)
        .await
        .map_err(|e| e.to_string())?;
    let topics = client
        .list_topics()
        .await
        .map_err(|e| format!("failed to list Redpanda topics: {}", e))?;

    if !topics.iter().any(|t| t.name == config.topic) {
        return Err(format!("task topic '{}' does not exist", config.topic));
    }
    debug!(topics = topics.len(), "Redpanda connection healthy");
    Ok(())
}

/// Probes the producer side and records the result in the health registry.
pub async fn check_producer(producer: &dyn TaskProducer) -> bool {
    let healthy = producer.is_healthy().await;
    if healthy {
        health().queue.set_healthy();
    } else {
        error!("Task queue health check failed");
        health().queue.set_unhealthy("task queue not accepting tasks");
    }
    healthy
}
