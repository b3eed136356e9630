//! Process configuration.

use anyhow::{Context, Result};
use engine_core::RateLimitConfig;
use event_store::{AnalyticsConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use task_queue::{QueueBackend, QueueConfig};
use worker::WorkerConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Settings {
    /// Load configuration from defaults, `config/default.toml` and the
    /// environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("ANALYTICS")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut settings: Settings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Flat variables for the knobs deployments set most often.
    ///
    /// The `__` nesting cannot express field names that contain an
    /// underscore, so these are read explicitly.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            self.store.url = url;
        }
        if let Some(brokers) = var("ANALYTICS_REDPANDA_BROKERS") {
            self.queue.redpanda.brokers =
                brokers.split(',').map(|s| s.trim().to_string()).collect();
            self.queue.backend = QueueBackend::Redpanda;
        }
        if let Some(topic) = var("ANALYTICS_REDPANDA_TOPIC") {
            self.queue.redpanda.topic = topic;
        }
        if let Some(username) = var("ANALYTICS_REDPANDA_SASL_USERNAME") {
            self.queue.redpanda.sasl_username = Some(username);
        }
        if let Some(password) = var("ANALYTICS_REDPANDA_SASL_PASSWORD") {
            self.queue.redpanda.sasl_password = Some(password);
        }
    }
}
