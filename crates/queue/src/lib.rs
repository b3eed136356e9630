//! Ingestion task queue.
//!
//! The ingestion route produces [`engine_core::IngestTask`]s and the worker
//! pool consumes them. Two transports are available: a bounded in-process
//! channel and a Redpanda topic.

pub mod channel;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod health;
pub mod producer;

pub use channel::ChannelQueue;
pub use config::*;
pub use consumer::{Delivery, RedpandaConsumer, TaskConsumer};
pub use producer::{RedpandaProducer, TaskProducer};

use engine_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Both ends of the configured queue.
#[derive(Clone)]
pub struct TaskQueue {
    pub producer: Arc<dyn TaskProducer>,
    pub consumer: Arc<dyn TaskConsumer>,
}

impl TaskQueue {
    /// An in-process queue.
    pub fn channel(capacity: usize, poll_timeout: Duration) -> Self {
        let queue = Arc::new(ChannelQueue::new(capacity, poll_timeout));
        Self {
            producer: queue.clone(),
            consumer: queue,
        }
    }

    /// Builds the backend selected by `config.backend`.
    pub async fn open(config: &QueueConfig) -> Result<Self> {
        match config.backend {
            QueueBackend::Channel => {
                info!(capacity = config.channel_capacity, "Using in-process task queue");
                Ok(Self::channel(
                    config.channel_capacity,
                    Duration::from_millis(config.poll_timeout_ms),
                ))
            }
            QueueBackend::Redpanda => {
                health::check_redpanda(&config.redpanda)
                    .await
                    .map_err(engine_core::Error::queue)?;
                info!(
                    brokers = %config.redpanda.broker_string(),
                    topic = %config.redpanda.topic,
                    "Using Redpanda task queue"
                );
                Ok(Self {
                    producer: Arc::new(RedpandaProducer::new(config.redpanda.clone())),
                    consumer: Arc::new(RedpandaConsumer::new(config.redpanda.clone())),
                })
            }
        }
    }

    /// Stops intake; workers drain what is already queued.
    pub fn close(&self) {
        self.consumer.close();
    }
}
