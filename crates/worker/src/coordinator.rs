//! Admission and dispatch of ingestion batches.

use engine_core::{
    Error, IngestTask, ParsedBatch, RateLimitErrorCode, RateLimiter, Result, RowError, TaskId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use task_queue::TaskProducer;
use telemetry::metrics;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Queued,
    DryRun,
}

/// Acknowledgment returned to the producer.
///
/// `Queued` means handed to the task queue, not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub status: SubmitStatus,
    pub queued_events: usize,
    pub task_id: Option<TaskId>,
    pub rejected: Vec<RowError>,
}

/// Gatekeeper between producers and the asynchronous persistence path.
#[derive(Clone)]
pub struct IngestionCoordinator {
    limiter: Arc<RateLimiter>,
    producer: Arc<dyn TaskProducer>,
}

impl IngestionCoordinator {
    pub fn new(limiter: Arc<RateLimiter>, producer: Arc<dyn TaskProducer>) -> Self {
        Self { limiter, producer }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn producer(&self) -> &Arc<dyn TaskProducer> {
        &self.producer
    }

    /// Takes one token for an inbound request.
    pub fn admit(&self) -> Result<()> {
        if self.limiter.admit() {
            return Ok(());
        }

        let retry_after = self.limiter.retry_after_secs();
        metrics().rate_limited_requests.inc();
        warn!(retry_after_secs = retry_after, "Ingestion request rate limited");
        Err(Error::rate_limit(
            RateLimitErrorCode::Exceeded,
            "ingestion rate limit exceeded",
            Some(retry_after),
        ))
    }

    /// Admits the request, then dispatches its valid events.
    pub async fn submit(&self, batch: ParsedBatch, dry_run: bool) -> Result<SubmitReceipt> {
        self.admit()?;
        self.dispatch(batch, dry_run).await
    }

    /// Dispatches an already admitted batch.
    ///
    /// A dry run, or a batch where every row was rejected, never reaches
    /// the queue.
    pub async fn dispatch(&self, batch: ParsedBatch, dry_run: bool) -> Result<SubmitReceipt> {
        let start = Instant::now();
        let received = batch.received();
        let accepted = batch.events.len();
        let ParsedBatch { events, rejected } = batch;

        metrics().ingest_requests.inc();
        metrics().events_received.inc_by(received as u64);
        metrics().events_rejected.inc_by(rejected.len() as u64);
        if !rejected.is_empty() {
            warn!(
                received = received,
                rejected = rejected.len(),
                first_error = %rejected[0],
                "Rejected invalid events"
            );
        }

        if dry_run {
            metrics().dry_run_requests.inc();
            info!(received = received, accepted = accepted, "Dry run validated batch");
            return Ok(SubmitReceipt {
                status: SubmitStatus::DryRun,
                queued_events: accepted,
                task_id: None,
                rejected,
            });
        }

        if events.is_empty() {
            return Ok(SubmitReceipt {
                status: SubmitStatus::Queued,
                queued_events: 0,
                task_id: None,
                rejected,
            });
        }

        let task_id = self.producer.enqueue(IngestTask::new(events)).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics().events_queued.inc_by(accepted as u64);
        metrics().ingest_latency_ms.observe(latency_ms);
        info!(
            task_id = %task_id,
            received = received,
            accepted = accepted,
            rejected = rejected.len(),
            latency_ms = latency_ms,
            "Batch queued"
        );

        Ok(SubmitReceipt {
            status: SubmitStatus::Queued,
            queued_events: accepted,
            task_id: Some(task_id),
            rejected,
        })
    }
}
