//! Chunked, duplicate-safe batch persistence.

use engine_core::limits::DEDUP_CHUNK_SIZE;
use engine_core::{Error, Event, InsertSummary};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::store::EventStore;

/// Result of a fully committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub chunks: usize,
    pub summary: InsertSummary,
}

/// A chunk failed after earlier chunks were already committed.
///
/// Committed chunks stay committed. Re-running the whole batch is safe
/// because those rows will be counted as duplicates.
#[derive(Debug, thiserror::Error)]
#[error(
    "chunk {failed_chunk} failed after {committed_chunks} committed chunk(s) \
     ({} inserted, {} duplicates): {source}",
    .committed.inserted,
    .committed.duplicates
)]
pub struct PartialBatchError {
    pub committed: InsertSummary,
    pub committed_chunks: usize,
    /// Zero-based index of the chunk that failed
    pub failed_chunk: usize,
    #[source]
    pub source: Error,
}

/// Writes batches in fixed-size chunks, one atomic insert per chunk.
#[derive(Clone)]
pub struct BatchDeduplicator {
    store: Arc<dyn EventStore>,
    chunk_size: usize,
}

impl BatchDeduplicator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_chunk_size(store, DEDUP_CHUNK_SIZE)
    }

    pub fn with_chunk_size(store: Arc<dyn EventStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Persists `events`, ignoring identity keys that already exist.
    ///
    /// Chunks are committed in order; the first failing chunk stops the
    /// batch and later chunks are not attempted.
    pub async fn insert(&self, events: &[Event]) -> Result<BatchOutcome, PartialBatchError> {
        let mut outcome = BatchOutcome::default();

        for (index, chunk) in events.chunks(self.chunk_size).enumerate() {
            match self.store.insert_ignoring_duplicates(chunk).await {
                Ok(inserted) => {
                    let chunk_summary = InsertSummary::from_chunk(chunk.len(), inserted);
                    outcome.summary += chunk_summary;
                    outcome.chunks += 1;

                    metrics().chunks_committed.inc();
                    metrics().rows_inserted.inc_by(chunk_summary.inserted);
                    metrics().rows_duplicate.inc_by(chunk_summary.duplicates);
                    debug!(
                        chunk = index,
                        rows = chunk.len(),
                        inserted = chunk_summary.inserted,
                        duplicates = chunk_summary.duplicates,
                        "Committed chunk"
                    );
                }
                Err(source) => {
                    metrics().chunk_failures.inc();
                    warn!(
                        chunk = index,
                        committed_chunks = outcome.chunks,
                        error = %source,
                        "Chunk insert failed"
                    );
                    return Err(PartialBatchError {
                        committed: outcome.summary,
                        committed_chunks: outcome.chunks,
                        failed_chunk: index,
                        source,
                    });
                }
            }
        }

        Ok(outcome)
    }
}
