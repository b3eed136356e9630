//! Mapping of driver errors onto engine error codes.

use engine_core::{Error, StoreErrorCode};

/// Maps a sqlx error to STORE_001 when the database could not be reached
/// and STORE_002 when a statement failed.
pub(crate) fn store_error(context: &str, err: sqlx::Error) -> Error {
    let code = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreErrorCode::Unavailable,
        _ => StoreErrorCode::QueryFailed,
    };
    Error::store(code, format!("{}: {}", context, err))
}
