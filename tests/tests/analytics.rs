//! End-to-end tests for the analytics routes.
//!
//! Events go in through POST /events and a worker drain, then come back
//! out through /stats/*.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

async fn seed(ctx: &TestContext, server: &TestServer, events: Vec<Value>) {
    server
        .post("/events")
        .content_type("application/json")
        .bytes(fixtures::array_payload(events).into())
        .await
        .assert_status(StatusCode::ACCEPTED);
    ctx.drain().await.expect("Failed to drain queue");
}

#[tokio::test]
async fn test_dau_counts_distinct_users_per_day() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let d = fixtures::date(2024, 3, 1);
    let d1 = fixtures::date(2024, 3, 2);

    seed(
        &ctx,
        &server,
        vec![
            fixtures::event("alice", "login", &fixtures::at(d, 9)),
            fixtures::event("alice", "click", &fixtures::at(d, 10)),
            fixtures::event("bob", "login", &fixtures::at(d, 23)),
            fixtures::event("carol", "login", &fixtures::at(d1, 0)),
        ],
    )
    .await;

    let response = server
        .get("/stats/dau")
        .add_query_param("from_date", "2024-03-01")
        .add_query_param("to_date", "2024-03-01")
        .await;
    response.assert_status_ok();
    response.assert_json(&json!([{ "day": "2024-03-01", "dau": 2 }]));

    let response = server
        .get("/stats/dau")
        .add_query_param("from_date", "2024-03-01")
        .add_query_param("to_date", "2024-03-02")
        .await;
    response.assert_json(&json!([
        { "day": "2024-03-01", "dau": 2 },
        { "day": "2024-03-02", "dau": 1 }
    ]));
}

#[tokio::test]
async fn test_dau_country_filter() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let d = fixtures::date(2024, 3, 1);

    seed(
        &ctx,
        &server,
        vec![
            fixtures::event_in("alice", "login", &fixtures::at(d, 9), "US"),
            fixtures::event_in("bob", "login", &fixtures::at(d, 9), "DE"),
            fixtures::event("carol", "login", &fixtures::at(d, 9)),
        ],
    )
    .await;

    let response = server
        .get("/stats/dau")
        .add_query_param("from_date", "2024-03-01")
        .add_query_param("to_date", "2024-03-01")
        .add_query_param("country", "US")
        .await;
    response.assert_json(&json!([{ "day": "2024-03-01", "dau": 1 }]));
}

#[tokio::test]
async fn test_dau_inverted_range_is_an_error() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/stats/dau")
        .add_query_param("from_date", "2024-03-05")
        .add_query_param("to_date", "2024-03-01")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "QUERY_001");
}

/// Ties on count are broken by event type, ascending
#[tokio::test]
async fn test_top_events_deterministic_tiebreak() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let d = fixtures::date(2024, 3, 1);

    let mut events = Vec::new();
    for (event_type, n) in [("b", 5), ("a", 5), ("c", 3)] {
        for i in 0..n {
            events.push(fixtures::event(&format!("u{}", i), event_type, &fixtures::at(d, 12)));
        }
    }
    seed(&ctx, &server, events).await;

    for _ in 0..3 {
        let response = server
            .get("/stats/top-events")
            .add_query_param("from_date", "2024-03-01")
            .add_query_param("to_date", "2024-03-01")
            .add_query_param("limit", "2")
            .await;
        response.assert_json(&json!([
            { "event_type": "a", "count": 5 },
            { "event_type": "b", "count": 5 }
        ]));
    }
}

#[tokio::test]
async fn test_top_events_rejects_bad_limit() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/stats/top-events")
        .add_query_param("from_date", "2024-03-01")
        .add_query_param("to_date", "2024-03-01")
        .add_query_param("limit", "0")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "QUERY_002");
}

/// Users first seen before the start date are not cohort members
#[tokio::test]
async fn test_retention_excludes_returning_users() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let before = fixtures::date(2024, 2, 28);
    let start = fixtures::date(2024, 3, 1);
    let day1 = fixtures::date(2024, 3, 2);
    let day3 = fixtures::date(2024, 3, 4);

    seed(
        &ctx,
        &server,
        vec![
            fixtures::event("veteran", "login", &fixtures::at(before, 9)),
            fixtures::event("veteran", "login", &fixtures::at(start, 9)),
            fixtures::event("veteran", "login", &fixtures::at(day1, 9)),
            fixtures::event("alice", "signup", &fixtures::at(start, 10)),
            fixtures::event("bob", "signup", &fixtures::at(start, 11)),
            fixtures::event("alice", "login", &fixtures::at(day1, 10)),
            fixtures::event("bob", "login", &fixtures::at(day3, 10)),
        ],
    )
    .await;

    let response = server
        .get("/stats/retention")
        .add_query_param("start_date", "2024-03-01")
        .add_query_param("windows", "3")
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({
        "start_date": "2024-03-01",
        "cohort_size": 2,
        "retention": [
            { "day": 1, "returning_users": 1 },
            { "day": 2, "returning_users": 0 },
            { "day": 3, "returning_users": 1 }
        ]
    }));
}

#[tokio::test]
async fn test_retention_empty_cohort() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/stats/retention")
        .add_query_param("start_date", "2024-03-01")
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({
        "start_date": "2024-03-01",
        "cohort_size": 0,
        "retention": []
    }));
}

#[tokio::test]
async fn test_retention_rejects_bad_input() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .get("/stats/retention")
        .add_query_param("start_date", "March 1st")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "QUERY_004");

    let response = server
        .get("/stats/retention")
        .add_query_param("start_date", "2024-03-01")
        .add_query_param("windows", "-1")
        .await;
    let body: Value = response.json();
    assert_eq!(body["code"], "QUERY_003");
}

/// Offset timestamps are bucketed by their UTC day
#[tokio::test]
async fn test_offset_timestamps_use_utc_days() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    seed(
        &ctx,
        &server,
        vec![
            fixtures::event("alice", "signup", "2024-03-01T10:00:00Z"),
            // 2024-03-02T04:30:00Z
            fixtures::event("alice", "login", "2024-03-01T23:30:00-05:00"),
            // 2024-03-01T03:00:00Z
            fixtures::event("bob", "signup", "2024-02-29T22:00:00-05:00"),
            // 2024-02-29T20:00:00Z
            fixtures::event("carol", "signup", "2024-03-01T01:00:00+05:00"),
        ],
    )
    .await;

    let response = server
        .get("/stats/dau")
        .add_query_param("from_date", "2024-02-29")
        .add_query_param("to_date", "2024-03-02")
        .await;
    response.assert_status_ok();
    response.assert_json(&json!([
        { "day": "2024-02-29", "dau": 1 },
        { "day": "2024-03-01", "dau": 2 },
        { "day": "2024-03-02", "dau": 1 }
    ]));

    let response = server
        .get("/stats/retention")
        .add_query_param("start_date", "2024-03-01")
        .add_query_param("windows", "2")
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({
        "start_date": "2024-03-01",
        "cohort_size": 2,
        "retention": [
            { "day": 1, "returning_users": 1 },
            { "day": 2, "returning_users": 0 }
        ]
    }));
}
