//! Size limits and tuning constants for the analytics engine.
//!
//! MEMORY SAFETY: the request-side limits bound the working set of a single
//! ingestion call. The `#[validate]` derive macro requires literal values in
//! attributes, so the string length limits are duplicated on `RawEvent`.
//! Keep both in sync when modifying.

// === Ingestion Request Limits ===

/// Maximum ingestion payload size in bytes (5MB).
pub const MAX_BATCH_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum events per ingestion request.
pub const MAX_BATCH_EVENTS: usize = 1000;

/// Maximum serialized `properties` document size in bytes (16KB).
pub const MAX_PROPERTIES_BYTES: usize = 16 * 1024;

/// User ID max length (chars).
pub const MAX_USER_ID_LEN: usize = 128;

/// Event type max length (chars).
pub const MAX_EVENT_TYPE_LEN: usize = 128;

/// Import batch key max length (chars).
pub const MAX_BATCH_KEY_LEN: usize = 128;

// === Persistence ===

/// Rows per atomic insert-or-ignore statement.
///
/// Bounds statement size and lock duration; commits are sequential.
pub const DEDUP_CHUNK_SIZE: usize = 200;

/// Rows buffered by the bulk importer before handing off to the deduplicator.
pub const IMPORT_BATCH_SIZE: usize = 1000;

// === Admission Control ===

/// Default token bucket capacity (requests).
pub const DEFAULT_BUCKET_CAPACITY: u32 = 100;

/// Default token refill rate (tokens per second).
pub const DEFAULT_REFILL_PER_SEC: f64 = 1.0;

// === Analytics ===

/// Default number of event types returned by top-events.
pub const DEFAULT_TOP_EVENTS_LIMIT: u32 = 10;

/// Largest accepted top-events limit.
pub const MAX_TOP_EVENTS_LIMIT: u32 = 1000;

/// Default retention window count (days).
pub const DEFAULT_RETENTION_WINDOWS: u32 = 7;

/// Largest accepted retention window count (days).
pub const MAX_RETENTION_WINDOWS: u32 = 366;
