//! Redpanda client construction.

use engine_core::{Error, Result};
use rskafka::client::partition::{PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;

use crate::config::RedpandaConfig;

/// Creates a TLS configuration for Redpanda Cloud.
fn tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Connects to the brokers, with TLS + SCRAM when credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    if let Some((username, password)) = config.credentials() {
        builder = builder
            .tls_config(tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    builder
        .build()
        .await
        .map_err(|e| Error::queue(format!("failed to connect to Redpanda: {}", e)))
}

/// Client for partition 0 of the task topic.
pub async fn task_partition(config: &RedpandaConfig) -> Result<Arc<PartitionClient>> {
    let client = connect(config).await?;
    let partition = client
        .partition_client(config.topic.clone(), 0, UnknownTopicHandling::Error)
        .await
        .map_err(|e| {
            Error::queue(format!(
                "failed to open partition 0 of '{}': {}",
                config.topic, e
            ))
        })?;
    Ok(Arc::new(partition))
}
