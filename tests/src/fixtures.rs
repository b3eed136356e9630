//! Test fixtures and event generators.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

/// A valid event row with a fresh identity key.
pub fn event(user_id: &str, event_type: &str, occurred_at: &str) -> Value {
    json!({
        "event_id": Uuid::new_v4().to_string(),
        "occurred_at": occurred_at,
        "user_id": user_id,
        "event_type": event_type,
        "properties": {}
    })
}

/// A valid event row carrying `properties.country`.
pub fn event_in(user_id: &str, event_type: &str, occurred_at: &str, country: &str) -> Value {
    json!({
        "event_id": Uuid::new_v4().to_string(),
        "occurred_at": occurred_at,
        "user_id": user_id,
        "event_type": event_type,
        "properties": { "country": country }
    })
}

/// N valid `page_view` events from distinct users on the same day.
pub fn events(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| event(&format!("user-{}", i), "page_view", "2024-03-01T12:00:00Z"))
        .collect()
}

/// Timestamp text for `day` at `hour` UTC.
pub fn at(day: NaiveDate, hour: u32) -> String {
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
        .to_rfc3339()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Array format payload.
pub fn array_payload(events: Vec<Value>) -> String {
    serde_json::to_string(&events).unwrap()
}

/// `{ "events": [...] }` payload.
pub fn object_payload(events: Vec<Value>) -> String {
    json!({ "events": events }).to_string()
}

/// Single event payload.
pub fn single_payload(event: Value) -> String {
    event.to_string()
}
