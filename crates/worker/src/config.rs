//! Worker pool configuration.

use engine_core::limits::DEDUP_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent ingest workers
    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,
    /// Rows per atomic insert
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Interval of the metrics snapshot log
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    /// How long shutdown waits for workers to drain the queue
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Pause after a failed task before fetching again
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_ingest_workers() -> usize {
    4
}

fn default_chunk_size() -> usize {
    DEDUP_CHUNK_SIZE
}

fn default_metrics_interval_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_error_backoff_ms() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingest_workers: default_ingest_workers(),
            chunk_size: default_chunk_size(),
            metrics_interval_secs: default_metrics_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
