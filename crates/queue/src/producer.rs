//! Task producers.

use async_trait::async_trait;
use chrono::Utc;
use engine_core::{Error, IngestTask, Result, TaskId};
use rskafka::client::partition::{Compression, PartitionClient};
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::config::RedpandaConfig;
use crate::connection;

/// Hands ingestion tasks to the asynchronous execution path.
///
/// A successful `enqueue` means the task was accepted by the transport,
/// not that its events were persisted.
#[async_trait]
pub trait TaskProducer: Send + Sync {
    async fn enqueue(&self, task: IngestTask) -> Result<TaskId>;

    async fn is_healthy(&self) -> bool;
}

pub(crate) fn compression(name: &str) -> Compression {
    match name {
        "gzip" => Compression::Gzip,
        "snappy" => Compression::Snappy,
        "lz4" => Compression::Lz4,
        "zstd" => Compression::Zstd,
        _ => Compression::NoCompression,
    }
}

/// Publishes tasks as JSON records to the task topic.
pub struct RedpandaProducer {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<PartitionClient>>>,
}

impl RedpandaProducer {
    pub fn new(config: RedpandaConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    async fn partition(&self) -> Result<Arc<PartitionClient>> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let client = connection::task_partition(&self.config).await?;
        *self.client.write().await = Some(client.clone());
        Ok(client)
    }

    async fn reset(&self) {
        *self.client.write().await = None;
    }
}

#[async_trait]
impl TaskProducer for RedpandaProducer {
    async fn enqueue(&self, task: IngestTask) -> Result<TaskId> {
        let start = Instant::now();
        let task_id = task.task_id;
        let events = task.len();

        let record = Record {
            key: Some(task_id.to_string().into_bytes()),
            value: Some(serde_json::to_vec(&task)?),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let client = self.partition().await.inspect_err(|_| {
            metrics().enqueue_errors.inc();
        })?;

        if let Err(e) = client
            .produce(vec![record], compression(&self.config.compression))
            .await
        {
            error!(task_id = %task_id, error = %e, "Failed to publish task to Redpanda");
            metrics().enqueue_errors.inc();
            self.reset().await;
            return Err(Error::queue(format!("failed to produce: {}", e)));
        }

        let elapsed = start.elapsed();
        metrics().tasks_enqueued.inc();
        metrics().enqueue_latency_ms.observe(elapsed.as_millis() as u64);
        debug!(
            task_id = %task_id,
            topic = %self.config.topic,
            events = events,
            latency_ms = %elapsed.as_millis(),
            "Published task to Redpanda"
        );

        Ok(task_id)
    }

    async fn is_healthy(&self) -> bool {
        self.partition().await.is_ok()
    }
}
