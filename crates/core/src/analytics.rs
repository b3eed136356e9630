//! Analytics query parameters and result rows.
//!
//! Queries are validated on construction so an invalid request never
//! reaches the store.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, QueryErrorCode, Result};
use crate::limits::{MAX_RETENTION_WINDOWS, MAX_TOP_EVENTS_LIMIT};

/// Inclusive calendar-day range (UTC).
///
/// Covers `from` 00:00:00 through the last instant of `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::query(
                QueryErrorCode::InvalidRange,
                format!("from_date {} is after to_date {}", from, to),
            ));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// First instant of the range.
    pub fn start(&self) -> DateTime<Utc> {
        day_start(self.from)
    }

    /// First instant after the range.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        day_start(next_day(self.to))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts < self.end_exclusive()
    }
}

/// Midnight UTC of `day`.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

/// Parses a `YYYY-MM-DD` query parameter.
///
/// A full ISO date-time is accepted too; only its date part is used.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        Error::query(
            QueryErrorCode::InvalidDate,
            format!("{} must be a YYYY-MM-DD date, got '{}'", field, raw),
        )
    })
}

/// Daily active users request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DauQuery {
    pub range: DateRange,
    /// Equality filter on `properties.country`
    pub country: Option<String>,
}

impl DauQuery {
    pub fn new(from: NaiveDate, to: NaiveDate, country: Option<String>) -> Result<Self> {
        Ok(Self {
            range: DateRange::new(from, to)?,
            country: country.filter(|c| !c.is_empty()),
        })
    }
}

/// Top event types request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopEventsQuery {
    pub range: DateRange,
    pub limit: u32,
}

impl TopEventsQuery {
    pub fn new(from: NaiveDate, to: NaiveDate, limit: i64) -> Result<Self> {
        if limit <= 0 || limit > MAX_TOP_EVENTS_LIMIT as i64 {
            return Err(Error::query(
                QueryErrorCode::InvalidLimit,
                format!("limit must be between 1 and {}, got {}", MAX_TOP_EVENTS_LIMIT, limit),
            ));
        }
        Ok(Self {
            range: DateRange::new(from, to)?,
            limit: limit as u32,
        })
    }
}

/// Cohort retention request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetentionQuery {
    pub start_date: NaiveDate,
    pub windows: u32,
}

impl RetentionQuery {
    pub fn new(start_date: NaiveDate, windows: i64) -> Result<Self> {
        if windows <= 0 || windows > MAX_RETENTION_WINDOWS as i64 {
            return Err(Error::query(
                QueryErrorCode::InvalidWindows,
                format!(
                    "windows must be between 1 and {}, got {}",
                    MAX_RETENTION_WINDOWS, windows
                ),
            ));
        }
        Ok(Self {
            start_date,
            windows: windows as u32,
        })
    }
}

/// Distinct users active on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActiveUsers {
    pub day: NaiveDate,
    pub dau: u64,
}

/// Row count for one event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: u64,
}

/// Cohort members active `day` days after the cohort day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPoint {
    pub day: u32,
    pub returning_users: u64,
}

/// Retention for the cohort of users first seen on `start_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub start_date: NaiveDate,
    pub cohort_size: u64,
    pub retention: Vec<RetentionPoint>,
}
