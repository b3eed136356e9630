//! In-process event store.
//!
//! Same semantics as the Postgres store, for local runs and tests. Supports
//! injected failures so partial-batch behavior can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use engine_core::{
    DailyActiveUsers, DateRange, Error, Event, EventTypeCount, Result, RetentionPoint,
    StoreErrorCode,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::store::{CohortCounts, EventStore};

#[derive(Debug, Default)]
struct FailurePlan {
    /// Insert calls allowed to succeed before failures start
    inserts_before_failure: Option<usize>,
    unavailable: bool,
}

/// Event store backed by a map keyed on event identity.
#[derive(Default)]
pub struct MemoryEventStore {
    rows: RwLock<BTreeMap<Uuid, Event>>,
    failures: Mutex<FailurePlan>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `n` insert calls succeed, then fails every later one.
    pub fn fail_inserts_after(&self, n: usize) {
        self.failures.lock().inserts_before_failure = Some(n);
    }

    /// Makes every operation fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.failures.lock().unavailable = unavailable;
    }

    pub fn clear_failures(&self) {
        *self.failures.lock() = FailurePlan::default();
    }

    pub fn get(&self, event_id: &Uuid) -> Option<Event> {
        self.rows.read().get(event_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.failures.lock().unavailable {
            return Err(unavailable());
        }
        Ok(())
    }

    fn check_insert_allowed(&self) -> Result<()> {
        let mut plan = self.failures.lock();
        if plan.unavailable {
            return Err(unavailable());
        }
        match plan.inserts_before_failure.as_mut() {
            Some(0) => Err(unavailable()),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Earliest event per user, as a UTC day.
    fn first_seen_days(rows: &BTreeMap<Uuid, Event>) -> HashMap<&str, NaiveDate> {
        let mut first: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for event in rows.values() {
            first
                .entry(event.user_id.as_str())
                .and_modify(|ts| *ts = (*ts).min(event.occurred_at))
                .or_insert(event.occurred_at);
        }
        first
            .into_iter()
            .map(|(user, ts)| (user, ts.date_naive()))
            .collect()
    }
}

fn unavailable() -> Error {
    Error::store(StoreErrorCode::Unavailable, "memory store unavailable")
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_ignoring_duplicates(&self, events: &[Event]) -> Result<u64> {
        self.check_insert_allowed()?;

        let mut rows = self.rows.write();
        let mut inserted = 0;
        for event in events {
            if !rows.contains_key(&event.event_id) {
                rows.insert(event.event_id, event.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn daily_active_users(
        &self,
        range: &DateRange,
        country: Option<&str>,
    ) -> Result<Vec<DailyActiveUsers>> {
        self.check_available()?;

        let rows = self.rows.read();
        let mut per_day: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
        for event in rows.values() {
            if !range.contains(event.occurred_at) {
                continue;
            }
            if let Some(country) = country {
                if event.property_text("country").as_deref() != Some(country) {
                    continue;
                }
            }
            per_day
                .entry(event.day())
                .or_default()
                .insert(event.user_id.as_str());
        }

        Ok(per_day
            .into_iter()
            .map(|(day, users)| DailyActiveUsers {
                day,
                dau: users.len() as u64,
            })
            .collect())
    }

    async fn top_event_types(&self, range: &DateRange, limit: u32) -> Result<Vec<EventTypeCount>> {
        self.check_available()?;

        let rows = self.rows.read();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for event in rows.values().filter(|e| range.contains(e.occurred_at)) {
            *counts.entry(event.event_type.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<EventTypeCount> = counts
            .into_iter()
            .map(|(event_type, count)| EventTypeCount {
                event_type: event_type.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn cohort_counts(&self, start_date: NaiveDate, windows: u32) -> Result<CohortCounts> {
        self.check_available()?;

        let rows = self.rows.read();
        let cohort: HashSet<&str> = Self::first_seen_days(&rows)
            .into_iter()
            .filter(|(_, day)| *day == start_date)
            .map(|(user, _)| user)
            .collect();

        if cohort.is_empty() {
            return Ok(CohortCounts::default());
        }

        let mut active: BTreeMap<u32, HashSet<&str>> = BTreeMap::new();
        for event in rows.values() {
            if !cohort.contains(event.user_id.as_str()) {
                continue;
            }
            let offset = (event.day() - start_date).num_days();
            if offset >= 1 && offset <= windows as i64 {
                active
                    .entry(offset as u32)
                    .or_default()
                    .insert(event.user_id.as_str());
            }
        }

        Ok(CohortCounts {
            cohort_size: cohort.len() as u64,
            returning: active
                .into_iter()
                .map(|(day, users)| RetentionPoint {
                    day,
                    returning_users: users.len() as u64,
                })
                .collect(),
        })
    }

    async fn count_events(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.rows.read().len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
