//! In-process metrics.
//!
//! Lock-free counters and histograms read by the periodic reporter and the
//! `/metrics` route.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements, stopping at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Upper bounds (ms) of the latency buckets. The last bucket also takes overflow.
const LATENCY_BOUNDS_MS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

/// Latency histogram in milliseconds.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; LATENCY_BOUNDS_MS.len()],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = LATENCY_BOUNDS_MS
            .partition_point(|&bound| bound < ms)
            .min(LATENCY_BOUNDS_MS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() as f64 / n as f64,
        }
    }

    /// `(upper_bound_ms, count)` pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        LATENCY_BOUNDS_MS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Metrics for the analytics engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion entry point
    pub ingest_requests: Counter,
    pub events_received: Counter,
    pub events_rejected: Counter,
    pub events_queued: Counter,
    pub dry_run_requests: Counter,
    pub rate_limited_requests: Counter,

    // Task queue
    pub tasks_enqueued: Counter,
    pub enqueue_errors: Counter,
    pub tasks_processed: Counter,
    pub task_failures: Counter,

    // Persistence
    pub rows_inserted: Counter,
    pub rows_duplicate: Counter,
    pub chunks_committed: Counter,
    pub chunk_failures: Counter,
    pub rows_imported: Counter,

    // Analytics
    pub queries_served: Counter,
    pub query_errors: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,

    // Latency histograms
    pub ingest_latency_ms: Histogram,
    pub enqueue_latency_ms: Histogram,
    pub insert_latency_ms: Histogram,
    pub query_latency_ms: Histogram,

    // Gauges
    pub queue_depth: Gauge,
    pub active_workers: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            ingest_requests: self.ingest_requests.get(),
            events_received: self.events_received.get(),
            events_rejected: self.events_rejected.get(),
            events_queued: self.events_queued.get(),
            dry_run_requests: self.dry_run_requests.get(),
            rate_limited_requests: self.rate_limited_requests.get(),
            tasks_enqueued: self.tasks_enqueued.get(),
            enqueue_errors: self.enqueue_errors.get(),
            tasks_processed: self.tasks_processed.get(),
            task_failures: self.task_failures.get(),
            rows_inserted: self.rows_inserted.get(),
            rows_duplicate: self.rows_duplicate.get(),
            chunk_failures: self.chunk_failures.get(),
            rows_imported: self.rows_imported.get(),
            queries_served: self.queries_served.get(),
            query_errors: self.query_errors.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            insert_latency_mean_ms: self.insert_latency_ms.mean(),
            query_latency_mean_ms: self.query_latency_ms.mean(),
            queue_depth: self.queue_depth.get(),
            active_workers: self.active_workers.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ingest_requests: u64,
    pub events_received: u64,
    pub events_rejected: u64,
    pub events_queued: u64,
    pub dry_run_requests: u64,
    pub rate_limited_requests: u64,
    pub tasks_enqueued: u64,
    pub enqueue_errors: u64,
    pub tasks_processed: u64,
    pub task_failures: u64,
    pub rows_inserted: u64,
    pub rows_duplicate: u64,
    pub chunk_failures: u64,
    pub rows_imported: u64,
    pub queries_served: u64,
    pub query_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub ingest_latency_mean_ms: f64,
    pub insert_latency_mean_ms: f64,
    pub query_latency_mean_ms: f64,
    pub queue_depth: u64,
    pub active_workers: u64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
