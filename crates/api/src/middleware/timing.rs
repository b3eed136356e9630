//! Request timing middleware.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Adds `X-Process-Time` (seconds, fractional) to every response.
pub async fn process_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed)) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
