//! Task consumers.
//!
//! Delivery is at-least-once: a task whose processing fails is not
//! committed and will be delivered again after [`TaskConsumer::reset`].

use async_trait::async_trait;
use engine_core::{Error, IngestTask, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{RedpandaConfig, StartOffset};
use crate::connection;

/// A task handed to a worker, with the position to commit once processed.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: IngestTask,
    /// Log offset of the task record; `None` for transports without one
    pub offset: Option<i64>,
}

impl Delivery {
    pub fn new(task: IngestTask) -> Self {
        Self { task, offset: None }
    }
}

/// Source of ingestion tasks for the worker pool.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Waits briefly for tasks. An empty vector means nothing arrived in
    /// time; `Error::QueueClosed` means the queue is closed and drained.
    async fn fetch(&self) -> Result<Vec<Delivery>>;

    /// Marks a delivery as processed.
    async fn commit(&self, delivery: &Delivery) -> Result<()>;

    /// Drops connection state after a failure so uncommitted tasks are
    /// fetched again.
    async fn reset(&self);

    /// Stops intake; `fetch` drains what is buffered, then reports closed.
    fn close(&self);

    /// How many workers may fetch concurrently, if limited.
    fn max_concurrency(&self) -> Option<usize> {
        None
    }
}

/// Reads task records from partition 0 of the task topic.
///
/// Offsets are tracked in-process. Fetching does not advance the committed
/// position, so a reset rewinds to the first uncommitted record. Only one
/// worker may consume at a time to keep commits in offset order.
pub struct RedpandaConsumer {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset to fetch
    fetch_offset: AtomicI64,
    /// First offset not yet committed
    committed_offset: AtomicI64,
    initialized: AtomicBool,
    closed: AtomicBool,
    fetch_lock: Mutex<()>,
}

impl RedpandaConsumer {
    pub fn new(config: RedpandaConfig) -> Self {
        info!(
            group_id = %config.consumer.group_id,
            topic = %config.topic,
            batch_size = config.consumer.batch_size,
            "Creating Redpanda task consumer"
        );

        Self {
            config,
            client: RwLock::new(None),
            fetch_offset: AtomicI64::new(-1),
            committed_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fetch_lock: Mutex::new(()),
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let client = connection::task_partition(&self.config).await?;

        if !self.initialized.load(Ordering::SeqCst) {
            let at = match self.config.consumer.start_from {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = client
                .get_offset(at)
                .await
                .map_err(|e| Error::queue(format!("failed to get offset: {}", e)))?;

            self.fetch_offset.store(offset, Ordering::SeqCst);
            self.committed_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);
            info!(
                topic = %self.config.topic,
                offset = offset,
                "Task consumer initialized at offset"
            );
        }

        *self.client.write().await = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl TaskConsumer for RedpandaConsumer {
    async fn fetch(&self) -> Result<Vec<Delivery>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::QueueClosed);
        }

        let _guard = self.fetch_lock.lock().await;
        let client = self.ensure_connected().await?;

        let start = Instant::now();
        let current = self.fetch_offset.load(Ordering::SeqCst);
        let max_bytes =
            (self.config.consumer.batch_size.max(1) * 1024 * 1024).min(i32::MAX as usize);

        let (records, _high_watermark) = client
            .fetch_records(
                current,
                1..max_bytes as i32,
                self.config.consumer.batch_timeout_ms as i32,
            )
            .await
            .map_err(|e| Error::queue(format!("failed to fetch records: {}", e)))?;

        let mut deliveries = Vec::with_capacity(records.len());
        let mut next = current;
        for record in records.into_iter().take(self.config.consumer.batch_size.max(1)) {
            next = next.max(record.offset + 1);
            let Some(value) = record.record.value else {
                continue;
            };
            match serde_json::from_slice::<IngestTask>(&value) {
                Ok(task) => deliveries.push(Delivery {
                    task,
                    offset: Some(record.offset),
                }),
                Err(e) => {
                    // A record that can never decode is skipped, not retried.
                    warn!(offset = record.offset, error = %e, "Undecodable task record");
                }
            }
        }
        self.fetch_offset.store(next, Ordering::SeqCst);

        // Skipped records at the head of the batch count as processed.
        if deliveries.is_empty() && next > current {
            self.committed_offset.fetch_max(next, Ordering::SeqCst);
        }

        debug!(
            tasks = deliveries.len(),
            offset_start = current,
            offset_next = next,
            latency_ms = %start.elapsed().as_millis(),
            "Fetched task records"
        );
        Ok(deliveries)
    }

    async fn commit(&self, delivery: &Delivery) -> Result<()> {
        if let Some(offset) = delivery.offset {
            let prev = self
                .committed_offset
                .fetch_max(offset + 1, Ordering::SeqCst);
            debug!(prev_offset = prev, new_offset = offset + 1, "Committed task offset");
        }
        Ok(())
    }

    async fn reset(&self) {
        *self.client.write().await = None;
        let committed = self.committed_offset.load(Ordering::SeqCst);
        self.fetch_offset.store(committed, Ordering::SeqCst);
        info!(offset = committed, "Task consumer reset to committed offset");
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn max_concurrency(&self) -> Option<usize> {
        Some(1)
    }
}
