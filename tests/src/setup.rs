//! Common test setup functions.

use api::{router, state::AppState};
use axum::Router;
use engine_core::{RateLimitConfig, Result};
use event_store::{
    AnalyticsConfig, BatchDeduplicator, EventStore, MemoryEventStore, PgEventStore, StoreConfig,
};
use std::sync::Arc;
use std::time::Duration;
use task_queue::{ChannelQueue, TaskProducer};
use worker::IngestWorker;

use crate::containers::TestContainers;
use crate::mocks::MockProducer;

/// Test context wiring the real router to a real queue and store.
///
/// Tasks are not picked up in the background; call [`TestContext::drain`]
/// to run the ingest worker over everything queued so far.
pub struct TestContext {
    pub containers: Option<TestContainers>,
    pub store: Arc<dyn EventStore>,
    pub memory: Option<Arc<MemoryEventStore>>,
    pub postgres: Option<Arc<PgEventStore>>,
    pub queue: Arc<ChannelQueue>,
    pub router: Router,
    worker: IngestWorker,
}

/// Knobs for a test context.
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub rate_limit: RateLimitConfig,
    pub analytics: AnalyticsConfig,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                capacity: 1000,
                refill_per_sec: 1000.0,
            },
            analytics: AnalyticsConfig::uncached(),
        }
    }
}

impl TestContext {
    /// Context backed by the in-memory store.
    pub async fn new() -> Self {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let memory = Arc::new(MemoryEventStore::new());
        let mut ctx = Self::build(memory.clone(), None, options);
        ctx.memory = Some(memory);
        ctx
    }

    /// Context backed by Postgres in a container (requires Docker).
    pub async fn postgres() -> Self {
        let containers = TestContainers::start().await;
        let config = StoreConfig {
            url: containers.database_url.clone(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            init_schema: true,
        };

        let store = Arc::new(connect_with_retry(&config).await);
        store.truncate().await.expect("Failed to truncate events");

        let mut ctx = Self::build(store.clone(), Some(containers), TestOptions::default());
        ctx.postgres = Some(store);
        ctx
    }

    fn build(
        store: Arc<dyn EventStore>,
        containers: Option<TestContainers>,
        options: TestOptions,
    ) -> Self {
        let queue = Arc::new(ChannelQueue::new(256, Duration::from_millis(10)));
        let state = AppState::from_parts(
            store.clone(),
            queue.clone(),
            options.rate_limit,
            &options.analytics,
        );
        let worker = IngestWorker::new(
            0,
            queue.clone(),
            BatchDeduplicator::new(store.clone()),
            Duration::ZERO,
        );

        Self {
            containers,
            store,
            memory: None,
            postgres: None,
            queue,
            router: router(state),
            worker,
        }
    }

    /// Context whose ingestion route dispatches into `producer`.
    pub fn with_producer(producer: Arc<dyn TaskProducer>) -> (Router, Arc<MemoryEventStore>) {
        let memory = Arc::new(MemoryEventStore::new());
        let options = TestOptions::default();
        let state = AppState::from_parts(
            memory.clone(),
            producer,
            options.rate_limit,
            &options.analytics,
        );
        (router(state), memory)
    }

    /// Context with a mock producer that records dispatched tasks.
    pub fn with_mock_producer() -> (Router, Arc<MockProducer>) {
        let producer = Arc::new(MockProducer::new());
        let (router, _store) = Self::with_producer(producer.clone());
        (router, producer)
    }

    /// Runs the ingest worker until the queue is empty.
    ///
    /// Returns the number of tasks processed.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        while self.queue.depth() > 0 {
            total += self.worker.process_batch().await?;
        }
        Ok(total)
    }

    /// Rows currently persisted.
    pub async fn stored_events(&self) -> u64 {
        self.store.count_events().await.expect("Count query failed")
    }
}

async fn connect_with_retry(config: &StoreConfig) -> PgEventStore {
    let mut last_error = None;
    for _ in 0..20 {
        match PgEventStore::connect(config).await {
            Ok(store) => return store,
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
    panic!("Postgres not ready: {:?}", last_error);
}
