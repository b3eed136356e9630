//! Bulk CSV import.
//!
//! Rows are parsed and validated on the blocking pool, buffered, and
//! written batch by batch through the deduplicator. Re-importing the same file is
//! safe; every row comes back as a duplicate.

use engine_core::limits::{IMPORT_BATCH_SIZE, MAX_BATCH_KEY_LEN};
use engine_core::{parse_properties_json, Error, Event, RawEvent, Result, ValidationErrorCode};
use event_store::BatchDeduplicator;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Parsed batches buffered ahead of the store writes.
const READ_AHEAD_BATCHES: usize = 2;

/// Expected columns; `properties_json` may be missing or empty.
#[derive(Debug, Deserialize)]
struct CsvRow {
    event_id: String,
    occurred_at: String,
    user_id: String,
    event_type: String,
    #[serde(default)]
    properties_json: Option<String>,
}

/// Counts for a finished (or aborted) import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub processed: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ImportSummary {
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// The import stopped early; rows flushed before the failure stay written.
#[derive(Debug, thiserror::Error)]
#[error("import aborted after {} rows: {source}", .summary.processed)]
pub struct ImportError {
    pub summary: ImportSummary,
    #[source]
    pub source: Error,
}

/// Streams a CSV file into the event store.
pub struct CsvImporter {
    dedup: BatchDeduplicator,
    batch_key: Option<String>,
    flush_size: usize,
}

impl CsvImporter {
    pub fn new(dedup: BatchDeduplicator, batch_key: Option<String>) -> Result<Self> {
        let batch_key = batch_key.filter(|k| !k.trim().is_empty());
        if let Some(key) = &batch_key {
            if key.chars().count() > MAX_BATCH_KEY_LEN {
                return Err(Error::validation(
                    ValidationErrorCode::InvalidFormat,
                    format!("batch key exceeds {} characters", MAX_BATCH_KEY_LEN),
                ));
            }
        }

        Ok(Self {
            dedup,
            batch_key,
            flush_size: IMPORT_BATCH_SIZE,
        })
    }

    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size.max(1);
        self
    }

    pub fn batch_key(&self) -> Option<&str> {
        self.batch_key.as_deref()
    }

    /// Reads every row of `reader`, which must start with a header line.
    ///
    /// Parsing runs on the blocking pool and hands validated rows over in
    /// flush-sized batches, so file reads never stall the runtime.
    pub async fn import<R>(&self, reader: R) -> std::result::Result<ImportSummary, ImportError>
    where
        R: io::Read + Send + 'static,
    {
        let start = Instant::now();
        let mut summary = ImportSummary::default();

        info!(batch_key = ?self.batch_key, flush_size = self.flush_size, "Starting CSV import");

        let (tx, mut rx) = mpsc::channel(READ_AHEAD_BATCHES);
        let batch_key = self.batch_key.clone();
        let flush_size = self.flush_size;
        let reading =
            tokio::task::spawn_blocking(move || read_rows(reader, batch_key, flush_size, tx));

        while let Some(message) = rx.recv().await {
            match message {
                ReadMessage::Rows(batch) => {
                    summary.processed += batch.processed;
                    summary.skipped += batch.skipped;
                    self.flush(batch.events, &mut summary, start).await?;
                }
                ReadMessage::Failed(reason) => {
                    summary.elapsed = start.elapsed();
                    return Err(ImportError {
                        summary,
                        source: Error::internal(reason),
                    });
                }
            }
        }

        if let Err(e) = reading.await {
            summary.elapsed = start.elapsed();
            return Err(ImportError {
                summary,
                source: Error::internal(format!("CSV reader stopped: {}", e)),
            });
        }
        summary.elapsed = start.elapsed();

        info!(
            processed = summary.processed,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            rows_per_sec = summary.rows_per_sec(),
            "CSV import complete"
        );
        Ok(summary)
    }

    async fn flush(
        &self,
        events: Vec<Event>,
        summary: &mut ImportSummary,
        start: Instant,
    ) -> std::result::Result<(), ImportError> {
        if events.is_empty() {
            return Ok(());
        }

        let rows = events.len();
        match self.dedup.insert(&events).await {
            Ok(outcome) => {
                summary.inserted += outcome.summary.inserted;
                summary.duplicates += outcome.summary.duplicates;
                summary.elapsed = start.elapsed();
                metrics().rows_imported.inc_by(rows as u64);
                info!(
                    rows = rows,
                    processed = summary.processed,
                    inserted = summary.inserted,
                    duplicates = summary.duplicates,
                    rows_per_sec = summary.rows_per_sec(),
                    "Flushed import batch"
                );
                Ok(())
            }
            Err(e) => {
                summary.inserted += e.committed.inserted;
                summary.duplicates += e.committed.duplicates;
                summary.elapsed = start.elapsed();
                error!(
                    rows = rows,
                    committed_chunks = e.committed_chunks,
                    error = %e.source,
                    "Import flush failed"
                );
                Err(ImportError {
                    summary: *summary,
                    source: e.source,
                })
            }
        }
    }
}

/// Validated rows read since the previous batch, with their tallies.
struct RowBatch {
    events: Vec<Event>,
    processed: u64,
    skipped: u64,
}

impl RowBatch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            processed: 0,
            skipped: 0,
        }
    }
}

enum ReadMessage {
    Rows(RowBatch),
    Failed(String),
}

/// Blocking side of an import. Stops early once the receiver is gone.
fn read_rows<R: io::Read>(
    reader: R,
    batch_key: Option<String>,
    flush_size: usize,
    tx: mpsc::Sender<ReadMessage>,
) {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut batch = RowBatch::with_capacity(flush_size);

    for (index, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1
        let line = index + 2;

        let event = match record {
            Ok(row) => to_event(row, batch_key.as_deref()),
            Err(e) if e.is_io_error() => {
                if tx.blocking_send(ReadMessage::Rows(batch)).is_ok() {
                    let _ = tx.blocking_send(ReadMessage::Failed(format!(
                        "failed to read CSV at line {}: {}",
                        line, e
                    )));
                }
                return;
            }
            Err(e) => Err(e.to_string()),
        };

        batch.processed += 1;
        match event {
            Ok(event) => batch.events.push(event),
            Err(reason) => {
                batch.skipped += 1;
                warn!(row = line, reason = %reason, "Skipping invalid row");
            }
        }

        if batch.events.len() >= flush_size {
            let full = std::mem::replace(&mut batch, RowBatch::with_capacity(flush_size));
            if tx.blocking_send(ReadMessage::Rows(full)).is_err() {
                return;
            }
        }
    }

    let _ = tx.blocking_send(ReadMessage::Rows(batch));
}

fn to_event(row: CsvRow, batch_key: Option<&str>) -> std::result::Result<Event, String> {
    let properties = parse_properties_json(row.properties_json.as_deref().unwrap_or(""))
        .map_err(|e| e.to_string())?;

    RawEvent {
        event_id: row.event_id,
        occurred_at: row.occurred_at,
        user_id: row.user_id,
        event_type: row.event_type,
        properties,
    }
    .into_event(batch_key.map(str::to_string))
    .map_err(|e| e.to_string())
}
