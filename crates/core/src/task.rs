//! Ingestion task envelope and insert accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use uuid::Uuid;

use crate::events::Event;

/// Opaque handle returned to producers for a queued batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A batch of validated events travelling through the task queue.
///
/// Delivery is at-least-once; running the same task twice is harmless
/// because persistence ignores identity keys that already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestTask {
    pub task_id: TaskId,
    pub enqueued_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

impl IngestTask {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            task_id: TaskId::new(),
            enqueued_at: Utc::now(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Rows persisted vs. rows ignored because their identity key existed.
///
/// `inserted + duplicates` always equals the number of rows attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
    pub inserted: u64,
    pub duplicates: u64,
}

impl InsertSummary {
    /// Accounting for one committed chunk, from the store's affected-row count.
    pub fn from_chunk(attempted: usize, inserted: u64) -> Self {
        let attempted = attempted as u64;
        Self {
            inserted,
            duplicates: attempted.saturating_sub(inserted),
        }
    }

    pub fn attempted(&self) -> u64 {
        self.inserted + self.duplicates
    }
}

impl AddAssign for InsertSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.duplicates += rhs.duplicates;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_accounting() {
        let summary = InsertSummary::from_chunk(200, 150);
        assert_eq!(summary.inserted, 150);
        assert_eq!(summary.duplicates, 50);
        assert_eq!(summary.attempted(), 200);
    }

    #[test]
    fn test_summaries_accumulate() {
        let mut total = InsertSummary::default();
        total += InsertSummary::from_chunk(200, 200);
        total += InsertSummary::from_chunk(50, 10);
        assert_eq!(total.inserted, 210);
        assert_eq!(total.duplicates, 40);
    }

    #[test]
    fn test_task_id_serializes_as_plain_uuid() {
        let task = IngestTask::new(Vec::new());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task_id"], task.task_id.to_string());
        assert!(task.is_empty());
    }
}
