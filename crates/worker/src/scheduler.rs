//! Worker scheduler for background tasks.

use event_store::BatchDeduplicator;
use std::sync::Arc;
use std::time::Duration;
use task_queue::TaskConsumer;
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::ingest::IngestWorker;

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    consumer: Arc<dyn TaskConsumer>,
    dedup: BatchDeduplicator,
}

/// Handles of the spawned background tasks.
pub struct WorkerHandles {
    pub ingest: Vec<JoinHandle<()>>,
    pub reporter: JoinHandle<()>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        consumer: Arc<dyn TaskConsumer>,
        dedup: BatchDeduplicator,
    ) -> Self {
        Self {
            config,
            consumer,
            dedup,
        }
    }

    /// Ingest workers to spawn, capped by what the consumer allows.
    pub fn worker_count(&self) -> usize {
        let wanted = self.config.ingest_workers.max(1);
        match self.consumer.max_concurrency() {
            Some(limit) if limit < wanted => {
                warn!(
                    configured = wanted,
                    limit = limit,
                    "Task consumer limits ingest concurrency"
                );
                limit.max(1)
            }
            _ => wanted,
        }
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> WorkerHandles {
        let count = self.worker_count();
        let mut ingest = Vec::with_capacity(count);

        for id in 0..count {
            let worker = IngestWorker::new(
                id,
                self.consumer.clone(),
                self.dedup.clone(),
                self.config.error_backoff(),
            );
            ingest.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        let scheduler = self.clone();
        let reporter = tokio::spawn(async move {
            scheduler.run_metrics_reporter().await;
        });

        info!(ingest_workers = count, "Background workers started");
        WorkerHandles { ingest, reporter }
    }

    async fn run_metrics_reporter(&self) {
        let mut ticker = interval(self.config.metrics_interval());
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                events_received = snapshot.events_received,
                events_rejected = snapshot.events_rejected,
                events_queued = snapshot.events_queued,
                rate_limited = snapshot.rate_limited_requests,
                tasks_processed = snapshot.tasks_processed,
                task_failures = snapshot.task_failures,
                rows_inserted = snapshot.rows_inserted,
                rows_duplicate = snapshot.rows_duplicate,
                queries_served = snapshot.queries_served,
                queue_depth = snapshot.queue_depth,
                ingest_latency_mean_ms = snapshot.ingest_latency_mean_ms,
                insert_latency_mean_ms = snapshot.insert_latency_mean_ms,
                "Metrics snapshot"
            );
        }
    }
}

impl WorkerHandles {
    /// Waits for the ingest workers to drain, up to `grace`, then stops
    /// whatever is still running.
    pub async fn shutdown(self, grace: Duration) {
        self.reporter.abort();

        let mut ingest = self.ingest;
        let drained = tokio::time::timeout(grace, async {
            for handle in ingest.iter_mut() {
                if let Err(e) = handle.await {
                    error!("Ingest worker panicked: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "Ingest workers did not drain in time, aborting"
            );
            for handle in &ingest {
                handle.abort();
            }
        } else {
            info!("Ingest workers drained");
        }
    }
}
