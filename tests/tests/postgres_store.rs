//! Event store tests against a real Postgres.
//!
//! Requires Docker (or `ANALYTICS_TEST_DATABASE_URL`). Run with
//! `--ignored`. Each test truncates the events table, so run them with
//! `--test-threads=1` when sharing one database.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{NaiveDate, TimeZone, Utc};
use engine_core::{DateRange, Event};
use event_store::{AggregationEngine, BatchDeduplicator, EventStore};
use integration_tests::{fixtures, setup::TestContext};
use std::sync::Arc;
use uuid::Uuid;

fn event(user: &str, event_type: &str, day: NaiveDate, hour: u32) -> Event {
    Event {
        event_id: Uuid::new_v4(),
        occurred_at: Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap()),
        user_id: user.to_string(),
        event_type: event_type.to_string(),
        properties: Default::default(),
        batch_key: None,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_ignores_existing_keys() {
    let ctx = TestContext::postgres().await;
    let store = ctx.postgres.clone().unwrap();
    let dedup = BatchDeduplicator::new(store.clone());
    let d = fixtures::date(2024, 3, 1);

    let batch: Vec<Event> = (0..450).map(|i| event(&format!("u{}", i), "view", d, 8)).collect();
    let first = dedup.insert(&batch).await.unwrap();
    assert_eq!(first.chunks, 3);
    assert_eq!(first.summary.inserted, 450);

    let mut replay = batch[..100].to_vec();
    replay.push(event("new", "view", d, 9));
    let second = dedup.insert(&replay).await.unwrap();
    assert_eq!(second.summary.inserted, 1);
    assert_eq!(second.summary.duplicates, 100);
    assert_eq!(ctx.stored_events().await, 451);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_repeated_key_within_one_chunk() {
    let ctx = TestContext::postgres().await;
    let dedup = BatchDeduplicator::new(ctx.store.clone());
    let one = event("u1", "view", fixtures::date(2024, 3, 1), 8);

    let outcome = dedup.insert(&[one.clone(), one]).await.unwrap();
    assert_eq!(outcome.summary.inserted, 1);
    assert_eq!(outcome.summary.duplicates, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_aggregations_match_in_memory_semantics() {
    let ctx = TestContext::postgres().await;
    let dedup = BatchDeduplicator::new(ctx.store.clone());
    let before = fixtures::date(2024, 2, 29);
    let start = fixtures::date(2024, 3, 1);
    let day2 = fixtures::date(2024, 3, 3);

    dedup
        .insert(&[
            event("veteran", "login", before, 9),
            event("veteran", "login", start, 9),
            event("alice", "B", start, 10),
            event("alice", "a", start, 11),
            event("bob", "B", start, 23),
            event("bob", "a", day2, 1),
        ])
        .await
        .unwrap();

    let range = DateRange::new(start, start).unwrap();
    let dau = ctx.store.daily_active_users(&range, None).await.unwrap();
    assert_eq!(dau.len(), 1);
    assert_eq!(dau[0].dau, 3);

    // "B" sorts before "a" bytewise
    let top = ctx.store.top_event_types(&range, 2).await.unwrap();
    assert_eq!(top[0].event_type, "B");
    assert_eq!(top[1].event_type, "a");

    let engine = AggregationEngine::uncached(ctx.store.clone());
    let report = engine
        .retention(&engine_core::RetentionQuery::new(start, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(report.cohort_size, 2);
    let returning: Vec<u64> = report.retention.iter().map(|p| p.returning_users).collect();
    assert_eq!(returning, vec![0, 1, 0]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_http_pipeline_against_postgres() {
    let ctx = TestContext::postgres().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let payload = fixtures::array_payload(fixtures::events(20));

    for _ in 0..2 {
        server
            .post("/events")
            .content_type("application/json")
            .bytes(payload.clone().into())
            .await
            .assert_status(StatusCode::ACCEPTED);
    }
    ctx.drain().await.unwrap();
    assert_eq!(ctx.stored_events().await, 20);

    let store: Arc<dyn EventStore> = ctx.store.clone();
    store.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_offset_timestamps_use_utc_days_in_postgres() {
    let ctx = TestContext::postgres().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let payload = fixtures::array_payload(vec![
        fixtures::event("alice", "signup", "2024-03-01T10:00:00Z"),
        fixtures::event("alice", "login", "2024-03-01T23:30:00-05:00"),
        fixtures::event("bob", "signup", "2024-02-29T22:00:00-05:00"),
        fixtures::event("carol", "signup", "2024-03-01T01:00:00+05:00"),
    ]);

    server
        .post("/events")
        .content_type("application/json")
        .bytes(payload.into())
        .await
        .assert_status(StatusCode::ACCEPTED);
    ctx.drain().await.unwrap();

    let range = DateRange::new(fixtures::date(2024, 2, 29), fixtures::date(2024, 3, 2)).unwrap();
    let dau: Vec<(String, u64)> = ctx
        .store
        .daily_active_users(&range, None)
        .await
        .unwrap()
        .into_iter()
        .map(|d| (d.day.to_string(), d.dau))
        .collect();
    assert_eq!(
        dau,
        vec![
            ("2024-02-29".to_string(), 1),
            ("2024-03-01".to_string(), 2),
            ("2024-03-02".to_string(), 1)
        ]
    );

    let counts = ctx
        .store
        .cohort_counts(fixtures::date(2024, 3, 1), 2)
        .await
        .unwrap();
    assert_eq!(counts.cohort_size, 2);
    assert_eq!(counts.returning.len(), 1);
    assert_eq!(counts.returning[0].day, 1);
    assert_eq!(counts.returning[0].returning_users, 1);
}
