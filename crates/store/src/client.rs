//! Postgres-backed event store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use engine_core::{
    day_start, DailyActiveUsers, DateRange, Event, EventTypeCount, Result, RetentionPoint,
};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::store_error;
use crate::schema;
use crate::store::{CohortCounts, EventStore};

const INSERT_EVENTS: &str = r#"
INSERT INTO events (event_id, occurred_at, user_id, event_type, properties, batch_key)
    (SELECT * FROM UNNEST(
        $1::uuid[],
        $2::timestamptz[],
        $3::text[],
        $4::text[],
        $5::jsonb[],
        $6::text[]))
ON CONFLICT (event_id) DO NOTHING
"#;

const DAILY_ACTIVE_USERS: &str = r#"
SELECT (occurred_at AT TIME ZONE 'UTC')::date AS day, COUNT(DISTINCT user_id) AS dau
FROM events
WHERE occurred_at >= $1 AND occurred_at < $2
  AND ($3::text IS NULL OR properties->>'country' = $3)
GROUP BY day
ORDER BY day
"#;

const TOP_EVENT_TYPES: &str = r#"
SELECT event_type, COUNT(*) AS event_count
FROM events
WHERE occurred_at >= $1 AND occurred_at < $2
GROUP BY event_type
ORDER BY event_count DESC, event_type COLLATE "C" ASC
LIMIT $3
"#;

const COHORT_SIZE: &str = r#"
SELECT COUNT(*) FROM (
    SELECT user_id
    FROM events
    GROUP BY user_id
    HAVING (MIN(occurred_at) AT TIME ZONE 'UTC')::date = $1
) AS cohort
"#;

const COHORT_RETURNING: &str = r#"
WITH cohort AS (
    SELECT user_id
    FROM events
    GROUP BY user_id
    HAVING (MIN(occurred_at) AT TIME ZONE 'UTC')::date = $1
)
SELECT ((e.occurred_at AT TIME ZONE 'UTC')::date - $1::date) AS day_offset,
       COUNT(DISTINCT e.user_id) AS returning_users
FROM events e
JOIN cohort c ON c.user_id = e.user_id
WHERE e.occurred_at >= $2 AND e.occurred_at < $3
GROUP BY day_offset
ORDER BY day_offset
"#;

/// Event store on a Postgres connection pool.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Connects the pool and, if configured, creates the schema.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| store_error("connect", e))?;

        info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Connected to Postgres event store"
        );

        if config.init_schema {
            schema::init_schema(&pool).await?;
        }

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deletes every event. Test cleanup only.
    pub async fn truncate(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE events")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("truncate", e))?;
        Ok(())
    }
}

/// Column arrays for one UNNEST insert.
#[derive(Default)]
struct EventColumns {
    event_ids: Vec<Uuid>,
    occurred_at: Vec<DateTime<Utc>>,
    user_ids: Vec<String>,
    event_types: Vec<String>,
    properties: Vec<Value>,
    batch_keys: Vec<Option<String>>,
}

impl EventColumns {
    fn from_events(events: &[Event]) -> Self {
        let mut cols = Self::default();
        for event in events {
            cols.event_ids.push(event.event_id);
            cols.occurred_at.push(event.occurred_at);
            cols.user_ids.push(event.user_id.clone());
            cols.event_types.push(event.event_type.clone());
            cols.properties.push(Value::Object(event.properties.clone()));
            cols.batch_keys.push(event.batch_key.clone());
        }
        cols
    }
}

fn to_u64(n: i64) -> u64 {
    n.max(0) as u64
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_ignoring_duplicates(&self, events: &[Event]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let cols = EventColumns::from_events(events);

        let result = sqlx::query(INSERT_EVENTS)
            .bind(&cols.event_ids)
            .bind(&cols.occurred_at)
            .bind(&cols.user_ids)
            .bind(&cols.event_types)
            .bind(&cols.properties)
            .bind(&cols.batch_keys)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("insert events", e))?;

        let elapsed = start.elapsed();
        metrics().insert_latency_ms.observe(elapsed.as_millis() as u64);

        let inserted = result.rows_affected();
        debug!(
            attempted = events.len(),
            inserted = inserted,
            latency_ms = %elapsed.as_millis(),
            "Inserted event chunk"
        );
        Ok(inserted)
    }

    async fn daily_active_users(
        &self,
        range: &DateRange,
        country: Option<&str>,
    ) -> Result<Vec<DailyActiveUsers>> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(DAILY_ACTIVE_USERS)
            .bind(range.start())
            .bind(range.end_exclusive())
            .bind(country)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("daily active users", e))?;

        Ok(rows
            .into_iter()
            .map(|(day, dau)| DailyActiveUsers {
                day,
                dau: to_u64(dau),
            })
            .collect())
    }

    async fn top_event_types(&self, range: &DateRange, limit: u32) -> Result<Vec<EventTypeCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(TOP_EVENT_TYPES)
            .bind(range.start())
            .bind(range.end_exclusive())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("top event types", e))?;

        Ok(rows
            .into_iter()
            .map(|(event_type, count)| EventTypeCount {
                event_type,
                count: to_u64(count),
            })
            .collect())
    }

    async fn cohort_counts(&self, start_date: NaiveDate, windows: u32) -> Result<CohortCounts> {
        let window_start = start_date
            .succ_opt()
            .map(day_start)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let window_end = start_date
            .checked_add_days(chrono::Days::new(windows as u64 + 1))
            .map(day_start)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        // Both reads see the same snapshot so returning users never exceed
        // the cohort they were counted against.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin retention read", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("begin retention read", e))?;

        let cohort_size: i64 = sqlx::query_scalar(COHORT_SIZE)
            .bind(start_date)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| store_error("cohort size", e))?;

        let rows: Vec<(i32, i64)> = if cohort_size == 0 {
            Vec::new()
        } else {
            sqlx::query_as(COHORT_RETURNING)
                .bind(start_date)
                .bind(window_start)
                .bind(window_end)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| store_error("cohort retention", e))?
        };

        tx.commit()
            .await
            .map_err(|e| store_error("commit retention read", e))?;

        Ok(CohortCounts {
            cohort_size: to_u64(cohort_size),
            returning: rows
                .into_iter()
                .filter(|(offset, _)| *offset >= 1)
                .map(|(offset, users)| RetentionPoint {
                    day: offset as u32,
                    returning_users: to_u64(users),
                })
                .collect(),
        })
    }

    async fn count_events(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count events", e))?;
        Ok(to_u64(count))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("ping", e))?;
        Ok(())
    }
}
