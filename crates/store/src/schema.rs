//! Postgres schema for the event store.
//!
//! Every statement is idempotent and safe to run on each startup.

use engine_core::Result;
use sqlx::PgPool;
use tracing::debug;

use crate::error::store_error;

/// One row per event identity key. The primary key is what makes
/// `ON CONFLICT DO NOTHING` inserts duplicate-safe.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id UUID PRIMARY KEY,
    occurred_at TIMESTAMPTZ NOT NULL,
    user_id TEXT NOT NULL CHECK (user_id <> ''),
    event_type TEXT NOT NULL CHECK (event_type <> ''),
    properties JSONB NOT NULL DEFAULT '{}'::jsonb,
    batch_key TEXT NULL,
    ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_OCCURRED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_occurred_at ON events (occurred_at)";

/// Serves cohort discovery (first event per user) and retention joins.
pub const CREATE_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_user_occurred ON events (user_id, occurred_at)";

pub const CREATE_EVENT_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_type_occurred ON events (event_type, occurred_at)";

pub const CREATE_COUNTRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_country ON events ((properties->>'country'))";

pub fn all_statements() -> Vec<&'static str> {
    vec![
        CREATE_EVENTS_TABLE,
        CREATE_OCCURRED_AT_INDEX,
        CREATE_USER_INDEX,
        CREATE_EVENT_TYPE_INDEX,
        CREATE_COUNTRY_INDEX,
    ]
}

/// Creates the events table and its indexes if missing.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for ddl in all_statements() {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| store_error("schema init", e))?;
    }

    debug!("Event store schema initialized");
    Ok(())
}
