//! Ingest worker: the task queue → event store pipeline.
//!
//! 1. Fetch tasks from the queue
//! 2. Persist each task's events through the deduplicator
//! 3. Commit the delivery (at-least-once)
//! 4. Repeat until the queue is closed and drained

use engine_core::{Error, Result};
use event_store::BatchDeduplicator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_queue::{Delivery, TaskConsumer};
use telemetry::metrics;
use tracing::{debug, error, info};

/// Worker that drains ingestion tasks into the event store.
///
/// A failed task is never retried inline. Its delivery is left uncommitted
/// and the consumer is reset, so the queue hands it out again.
pub struct IngestWorker {
    id: usize,
    consumer: Arc<dyn TaskConsumer>,
    dedup: BatchDeduplicator,
    error_backoff: Duration,
}

impl IngestWorker {
    pub fn new(
        id: usize,
        consumer: Arc<dyn TaskConsumer>,
        dedup: BatchDeduplicator,
        error_backoff: Duration,
    ) -> Self {
        Self {
            id,
            consumer,
            dedup,
            error_backoff,
        }
    }

    /// Runs until the queue reports closed.
    pub async fn run(&self) {
        info!(
            worker = self.id,
            chunk_size = self.dedup.chunk_size(),
            "Ingest worker starting"
        );
        metrics().active_workers.inc();

        loop {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(worker = self.id, tasks = count, "Processed tasks");
                    }
                }
                Err(Error::QueueClosed) => break,
                Err(e) => {
                    error!(worker = self.id, error = %e, "Ingest batch failed");
                    tokio::time::sleep(self.error_backoff).await;
                    self.consumer.reset().await;
                }
            }
        }

        metrics().active_workers.dec();
        info!(worker = self.id, "Ingest worker stopped");
    }

    /// Fetches and processes one round of deliveries.
    ///
    /// Stops at the first failing task; deliveries after it stay
    /// uncommitted as well.
    pub async fn process_batch(&self) -> Result<usize> {
        let deliveries = self.consumer.fetch().await?;

        for delivery in &deliveries {
            self.process(delivery).await?;
            self.consumer.commit(delivery).await?;
        }

        Ok(deliveries.len())
    }

    async fn process(&self, delivery: &Delivery) -> Result<()> {
        let start = Instant::now();
        let task = &delivery.task;

        match self.dedup.insert(&task.events).await {
            Ok(outcome) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                metrics().tasks_processed.inc();
                info!(
                    worker = self.id,
                    task_id = %task.task_id,
                    events = task.len(),
                    inserted = outcome.summary.inserted,
                    duplicates = outcome.summary.duplicates,
                    chunks = outcome.chunks,
                    latency_ms = latency_ms,
                    "Task persisted"
                );
                Ok(())
            }
            Err(e) => {
                metrics().task_failures.inc();
                error!(
                    worker = self.id,
                    task_id = %task.task_id,
                    offset = ?delivery.offset,
                    committed_chunks = e.committed_chunks,
                    inserted = e.committed.inserted,
                    duplicates = e.committed.duplicates,
                    error = %e.source,
                    "Task failed, leaving it uncommitted"
                );
                Err(e.source)
            }
        }
    }
}
