//! Event model and boundary validation.
//!
//! Producers send loosely-typed JSON. Each row is validated on its own so a
//! bad row never aborts the rest of its batch:
//! - Parsing the request body (3 accepted shapes)
//! - Per-row validation into a persisted-ready [`Event`]
//! - Collecting [`RowError`]s for the rows that were skipped

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{Error, Result, ValidationErrorCode};
use crate::limits::{MAX_BATCH_EVENTS, MAX_PROPERTIES_BYTES};

/// Free-form key/value document attached to an event.
///
/// Absence is always represented as an empty map.
pub type Properties = Map<String, Value>;

/// A validated event, ready to persist.
///
/// `event_id` is the identity key: two events with the same id are the same
/// logical event regardless of payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub properties: Properties,
    /// Import tag; `None` for events that arrived over the ingestion API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_key: Option<String>,
}

impl Event {
    /// Text value of a top-level property.
    ///
    /// Mirrors Postgres `properties->>'key'`: strings come back unquoted,
    /// other scalars and documents as their JSON text, `null` as `None`.
    pub fn property_text(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.properties.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Calendar day of `occurred_at` (UTC).
    pub fn day(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

/// Event as received from a producer, before validation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawEvent {
    /// Identity key (UUID text)
    pub event_id: String,

    /// Event time, ISO-8601
    pub occurred_at: String,

    #[validate(length(min = 1, max = 128), custom(function = "storable_text"))]
    pub user_id: String,

    #[validate(length(min = 1, max = 128), custom(function = "storable_text"))]
    pub event_type: String,

    /// Must be an object when present
    #[serde(default)]
    pub properties: Option<Value>,
}

/// Postgres text and jsonb cannot hold U+0000.
const NUL: char = '\0';

fn storable_text(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some(Cow::Borrowed("must not be blank"));
        return Err(err);
    }
    if value.contains(NUL) {
        let mut err = ValidationError::new("nul");
        err.message = Some(Cow::Borrowed("must not contain NUL characters"));
        return Err(err);
    }
    Ok(())
}

/// A validation failure pinned to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl RawEvent {
    /// Deserialize one JSON row.
    pub fn from_value(value: Value) -> std::result::Result<Self, FieldError> {
        serde_json::from_value(value).map_err(|e| FieldError::new("event", e.to_string()))
    }

    /// Validate and convert into a persisted-ready [`Event`].
    pub fn into_event(self, batch_key: Option<String>) -> std::result::Result<Event, FieldError> {
        self.validate().map_err(first_field_error)?;

        let event_id = Uuid::parse_str(self.event_id.trim())
            .map_err(|e| FieldError::new("event_id", format!("invalid UUID: {}", e)))?;

        let occurred_at = parse_timestamp(&self.occurred_at).ok_or_else(|| {
            FieldError::new(
                "occurred_at",
                format!("unparseable timestamp '{}'", self.occurred_at),
            )
        })?;

        let properties = normalize_properties(self.properties)?;

        Ok(Event {
            event_id,
            occurred_at,
            user_id: self.user_id,
            event_type: self.event_type,
            properties,
            batch_key,
        })
    }
}

/// Picks a deterministic field error out of a validator report.
fn first_field_error(errors: ValidationErrors) -> FieldError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    match fields.into_iter().next() {
        Some((field, errs)) => {
            let message = errs
                .first()
                .map(describe_validation_error)
                .unwrap_or_else(|| "invalid".to_string());
            FieldError::new(field.to_string(), message)
        }
        None => FieldError::new("event", "invalid"),
    }
}

fn describe_validation_error(err: &ValidationError) -> String {
    if let Some(msg) = &err.message {
        return msg.to_string();
    }
    match err.code.as_ref() {
        "length" => {
            let max = err
                .params
                .get("max")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".into());
            format!("must be between 1 and {} characters", max)
        }
        code => code.to_string(),
    }
}

/// Parses an event timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive ISO-8601 date-time / date
/// which is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalize_properties(raw: Option<Value>) -> std::result::Result<Properties, FieldError> {
    let properties = match raw {
        None | Some(Value::Null) => return Ok(Properties::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(FieldError::new(
                "properties",
                format!("must be a JSON object, got {}", json_kind(&other)),
            ))
        }
    };

    if let Some(path) = nul_path(&properties) {
        return Err(FieldError::new(
            "properties",
            format!("'{}' contains a NUL character", path),
        ));
    }

    let size = serde_json::to_vec(&properties).map(|v| v.len()).unwrap_or(0);
    if size > MAX_PROPERTIES_BYTES {
        return Err(FieldError::new(
            "properties",
            format!(
                "{}KB exceeds {}KB limit",
                size / 1024,
                MAX_PROPERTIES_BYTES / 1024
            ),
        ));
    }

    Ok(properties)
}

/// Path of the first key or string value holding a NUL, if any.
fn nul_path(properties: &Properties) -> Option<String> {
    fn walk(value: &Value, path: &str) -> Option<String> {
        match value {
            Value::String(s) if s.contains(NUL) => Some(path.to_string()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| walk(item, &format!("{}[{}]", path, i))),
            Value::Object(map) => find_in_map(map, path),
            _ => None,
        }
    }

    fn find_in_map(map: &Properties, prefix: &str) -> Option<String> {
        map.iter().find_map(|(key, value)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            if key.contains(NUL) {
                return Some(path.replace(NUL, "\\0"));
            }
            walk(value, &path)
        })
    }

    find_in_map(properties, "")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a properties document given as JSON text (bulk import column).
pub fn parse_properties_json(raw: &str) -> std::result::Result<Option<Value>, FieldError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| FieldError::new("properties", format!("malformed JSON: {}", e)))
}

/// A rejected row of an ingestion batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub index: usize,
    pub field: String,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event[{}].{}: {}", self.index, self.field, self.message)
    }
}

/// Result of validating an ingestion payload row by row.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub events: Vec<Event>,
    pub rejected: Vec<RowError>,
}

impl ParsedBatch {
    /// Total rows seen, accepted or not.
    pub fn received(&self) -> usize {
        self.events.len() + self.rejected.len()
    }
}

/// Parse an ingestion request body.
///
/// Supports:
/// 1. Array: `[event, event, ...]`
/// 2. Object with events: `{ "events": [...] }`
/// 3. Single event: `{ "event_id": "...", ... }`
///
/// Only the envelope can fail here; row problems end up in
/// [`ParsedBatch::rejected`].
pub fn parse_batch(bytes: &[u8]) -> Result<ParsedBatch> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        Error::validation(
            ValidationErrorCode::InvalidFormat,
            format!("invalid JSON: {}", e),
        )
    })?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => {
            if let Some(events) = obj.remove("events") {
                match events {
                    Value::Array(rows) => rows,
                    _ => {
                        return Err(Error::validation(
                            ValidationErrorCode::InvalidFormat,
                            "'events' must be an array",
                        ))
                    }
                }
            } else if obj.contains_key("event_id") {
                vec![Value::Object(obj)]
            } else {
                return Err(Error::validation(
                    ValidationErrorCode::InvalidFormat,
                    "object must have an 'events' array or be a single event with 'event_id'",
                ));
            }
        }
        _ => {
            return Err(Error::validation(
                ValidationErrorCode::InvalidFormat,
                "request body must be an array of events or an object",
            ))
        }
    };

    if rows.len() > MAX_BATCH_EVENTS {
        return Err(Error::validation(
            ValidationErrorCode::BatchTooLarge,
            format!(
                "batch has {} events, exceeds {} limit",
                rows.len(),
                MAX_BATCH_EVENTS
            ),
        ));
    }

    Ok(validate_rows(rows))
}

/// Validate already-split JSON rows.
pub fn validate_rows(rows: Vec<Value>) -> ParsedBatch {
    let mut batch = ParsedBatch {
        events: Vec::with_capacity(rows.len()),
        rejected: Vec::new(),
    };

    for (index, row) in rows.into_iter().enumerate() {
        match RawEvent::from_value(row).and_then(|raw| raw.into_event(None)) {
            Ok(event) => batch.events.push(event),
            Err(e) => batch.rejected.push(RowError {
                index,
                field: e.field,
                message: e.message,
            }),
        }
    }

    batch
}
