//! Analytics endpoints.
//!
//! All date parameters are `YYYY-MM-DD` calendar days in UTC; ranges are
//! inclusive of both ends.

use axum::{
    extract::{Query, State},
    Json,
};
use engine_core::limits::{DEFAULT_RETENTION_WINDOWS, DEFAULT_TOP_EVENTS_LIMIT};
use engine_core::{
    parse_date, DailyActiveUsers, DauQuery, Error, EventTypeCount, QueryErrorCode, Result,
    RetentionQuery, RetentionReport, TopEventsQuery,
};
use serde::Deserialize;

use crate::response::ApiError;
use crate::state::AppState;

/// Raw query string. Everything is optional so that missing or malformed
/// values surface as coded errors instead of extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub country: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub windows: Option<String>,
}

fn required_date(field: &str, raw: Option<&str>) -> Result<chrono::NaiveDate> {
    match raw {
        Some(raw) => parse_date(field, raw),
        None => Err(Error::query(
            QueryErrorCode::InvalidDate,
            format!("{} is required", field),
        )),
    }
}

fn integer(raw: Option<&str>, default: u32, code: QueryErrorCode, field: &str) -> Result<i64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default as i64),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            Error::query(code, format!("{} must be an integer, got '{}'", field, raw))
        }),
    }
}

impl StatsParams {
    pub fn dau(&self) -> Result<DauQuery> {
        DauQuery::new(
            required_date("from_date", self.from_date.as_deref())?,
            required_date("to_date", self.to_date.as_deref())?,
            self.country.as_ref().map(|c| c.trim().to_string()),
        )
    }

    pub fn top_events(&self) -> Result<TopEventsQuery> {
        let limit = integer(
            self.limit.as_deref(),
            DEFAULT_TOP_EVENTS_LIMIT,
            QueryErrorCode::InvalidLimit,
            "limit",
        )?;
        TopEventsQuery::new(
            required_date("from_date", self.from_date.as_deref())?,
            required_date("to_date", self.to_date.as_deref())?,
            limit,
        )
    }

    pub fn retention(&self) -> Result<RetentionQuery> {
        let windows = integer(
            self.windows.as_deref(),
            DEFAULT_RETENTION_WINDOWS,
            QueryErrorCode::InvalidWindows,
            "windows",
        )?;
        RetentionQuery::new(
            required_date("start_date", self.start_date.as_deref())?,
            windows,
        )
    }
}

/// GET /stats/dau
pub async fn dau_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> std::result::Result<Json<Vec<DailyActiveUsers>>, ApiError> {
    let query = params.dau()?;
    Ok(Json(state.analytics.daily_active_users(&query).await?))
}

/// GET /stats/top-events
pub async fn top_events_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> std::result::Result<Json<Vec<EventTypeCount>>, ApiError> {
    let query = params.top_events()?;
    Ok(Json(state.analytics.top_events(&query).await?))
}

/// GET /stats/retention
pub async fn retention_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> std::result::Result<Json<RetentionReport>, ApiError> {
    let query = params.retention()?;
    Ok(Json(state.analytics.retention(&query).await?))
}
