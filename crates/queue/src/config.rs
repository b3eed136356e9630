//! Task queue configuration.

use serde::{Deserialize, Serialize};

/// Which transport carries ingestion tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Bounded in-process channel; tasks do not survive a restart
    #[default]
    Channel,
    /// Kafka-protocol log on Redpanda
    Redpanda,
}

/// Task queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    /// Channel backend: tasks buffered before enqueue waits
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Channel backend: how long a fetch waits for a task
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default)]
    pub redpanda: RedpandaConfig,
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_poll_timeout_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            channel_capacity: default_channel_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            redpanda: RedpandaConfig::default(),
        }
    }
}

/// Redpanda connection and topic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// Topic carrying ingestion tasks (partition 0)
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// SASL/SCRAM-SHA-256 username; enables TLS when set with a password
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_topic() -> String {
    "ingest-tasks".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            compression: default_compression(),
            sasl_username: None,
            sasl_password: None,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Both SASL credentials, if configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Where a fresh consumer starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    #[default]
    Latest,
}

/// Redpanda consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Label used in logs
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Upper bound on tasks returned per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Max time a fetch waits for records
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default)]
    pub start_from: StartOffset,
}

fn default_group_id() -> String {
    "analytics-engine".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            start_from: StartOffset::default(),
        }
    }
}
