//! Storage seam shared by the Postgres and in-memory backends.

use async_trait::async_trait;
use chrono::NaiveDate;
use engine_core::{DailyActiveUsers, DateRange, Event, EventTypeCount, Result, RetentionPoint};

/// Raw cohort counts for one cohort day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortCounts {
    pub cohort_size: u64,
    /// Offsets with at least one returning user, ascending. Offsets with no
    /// activity are absent.
    pub returning: Vec<RetentionPoint>,
}

/// Durable event storage keyed by event identity.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts `events` as one atomic statement, silently skipping rows
    /// whose `event_id` already exists (or repeats within `events`).
    ///
    /// Returns the number of rows actually written.
    async fn insert_ignoring_duplicates(&self, events: &[Event]) -> Result<u64>;

    /// Distinct users per UTC day in `range`, ascending by day. Days without
    /// activity are omitted.
    async fn daily_active_users(
        &self,
        range: &DateRange,
        country: Option<&str>,
    ) -> Result<Vec<DailyActiveUsers>>;

    /// Event types in `range` ordered by count descending, then event type
    /// ascending (byte order).
    async fn top_event_types(&self, range: &DateRange, limit: u32) -> Result<Vec<EventTypeCount>>;

    /// Users whose earliest event falls on `start_date`, and how many of
    /// them were active on each of the following `windows` days.
    async fn cohort_counts(&self, start_date: NaiveDate, windows: u32) -> Result<CohortCounts>;

    async fn count_events(&self) -> Result<u64>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;
}
