//! Aggregation engine over persisted events.

use engine_core::{
    DailyActiveUsers, DauQuery, EventTypeCount, Result, RetentionPoint, RetentionQuery,
    RetentionReport, TopEventsQuery,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::store::{CohortCounts, EventStore};

/// Result cache settings. A TTL of zero disables caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,
}

fn default_cache_ttl_secs() -> u64 {
    10
}

fn default_cache_max_entries() -> u64 {
    1000
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl AnalyticsConfig {
    pub fn uncached() -> Self {
        Self {
            cache_ttl_secs: 0,
            ..Self::default()
        }
    }
}

struct QueryCaches {
    dau: Cache<DauQuery, Arc<Vec<DailyActiveUsers>>>,
    top_events: Cache<TopEventsQuery, Arc<Vec<EventTypeCount>>>,
    retention: Cache<RetentionQuery, Arc<RetentionReport>>,
}

impl QueryCaches {
    fn new(config: &AnalyticsConfig) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            dau: Cache::builder()
                .max_capacity(config.cache_max_entries)
                .time_to_live(ttl)
                .build(),
            top_events: Cache::builder()
                .max_capacity(config.cache_max_entries)
                .time_to_live(ttl)
                .build(),
            retention: Cache::builder()
                .max_capacity(config.cache_max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }
}

/// Read-only analytics over the event store.
///
/// Queries arrive already validated, so every call here goes straight to
/// the store (or the short-lived result cache).
#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn EventStore>,
    caches: Option<Arc<QueryCaches>>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn EventStore>, config: &AnalyticsConfig) -> Self {
        let caches = (config.cache_ttl_secs > 0).then(|| Arc::new(QueryCaches::new(config)));
        Self { store, caches }
    }

    pub fn uncached(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, &AnalyticsConfig::uncached())
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Distinct users per day, ascending; days without activity are absent.
    pub async fn daily_active_users(&self, query: &DauQuery) -> Result<Vec<DailyActiveUsers>> {
        let store = &self.store;
        let rows = cached(
            self.caches.as_ref().map(|c| &c.dau),
            query,
            "dau",
            |rows| rows.len(),
            || async move {
                let rows = store
                    .daily_active_users(&query.range, query.country.as_deref())
                    .await?;
                Ok(Arc::new(rows))
            },
        )
        .await?;
        Ok(rows.as_ref().clone())
    }

    /// The `limit` most frequent event types, ties broken by name.
    pub async fn top_events(&self, query: &TopEventsQuery) -> Result<Vec<EventTypeCount>> {
        let store = &self.store;
        let rows = cached(
            self.caches.as_ref().map(|c| &c.top_events),
            query,
            "top_events",
            |rows| rows.len(),
            || async move {
                let rows = store.top_event_types(&query.range, query.limit).await?;
                Ok(Arc::new(rows))
            },
        )
        .await?;
        Ok(rows.as_ref().clone())
    }

    /// Retention of the cohort first seen on `start_date`.
    ///
    /// A non-empty cohort gets one point per day `1..=windows`, zero-filled.
    /// An empty cohort gets `cohort_size` 0 and no points.
    pub async fn retention(&self, query: &RetentionQuery) -> Result<RetentionReport> {
        let store = &self.store;
        let report = cached(
            self.caches.as_ref().map(|c| &c.retention),
            query,
            "retention",
            |report| report.retention.len(),
            || async move {
                let counts = store.cohort_counts(query.start_date, query.windows).await?;
                Ok(Arc::new(build_report(query, counts)))
            },
        )
        .await?;
        Ok(report.as_ref().clone())
    }
}

async fn cached<K, V, F, Fut>(
    cache: Option<&Cache<K, V>>,
    key: &K,
    name: &'static str,
    rows: fn(&V) -> usize,
    run: F,
) -> Result<V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>>,
{
    if let Some(cache) = cache {
        if let Some(hit) = cache.get(key).await {
            metrics().cache_hits.inc();
            debug!(query = name, "Analytics cache hit");
            return Ok(hit);
        }
        metrics().cache_misses.inc();
    }

    let start = Instant::now();
    let result = run().await;
    let latency_ms = start.elapsed().as_millis() as u64;
    metrics().query_latency_ms.observe(latency_ms);

    match result {
        Ok(value) => {
            metrics().queries_served.inc();
            info!(
                query = name,
                params = ?key,
                rows = rows(&value),
                latency_ms = latency_ms,
                "Analytics query served"
            );
            if let Some(cache) = cache {
                cache.insert(key.clone(), value.clone()).await;
            }
            Ok(value)
        }
        Err(e) => {
            metrics().query_errors.inc();
            warn!(query = name, params = ?key, error = %e, "Analytics query failed");
            Err(e)
        }
    }
}

fn build_report(query: &RetentionQuery, counts: CohortCounts) -> RetentionReport {
    if counts.cohort_size == 0 {
        return RetentionReport {
            start_date: query.start_date,
            cohort_size: 0,
            retention: Vec::new(),
        };
    }

    let returning: HashMap<u32, u64> = counts
        .returning
        .into_iter()
        .map(|p| (p.day, p.returning_users))
        .collect();
    let retention = (1..=query.windows)
        .map(|day| RetentionPoint {
            day,
            returning_users: returning.get(&day).copied().unwrap_or(0),
        })
        .collect();

    RetentionReport {
        start_date: query.start_date,
        cohort_size: counts.cohort_size,
        retention,
    }
}
