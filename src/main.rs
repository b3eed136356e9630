//! Analytics Engine
//!
//! Idempotent event ingestion and time-windowed product analytics:
//! - Batch validation and rate-limited admission
//! - Asynchronous, duplicate-safe persistence through a task queue
//! - DAU, top events and cohort retention over the event store
//! - Bulk CSV import

mod settings;

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use event_store::BatchDeduplicator;
use task_queue::TaskQueue;
use telemetry::init_tracing_from_env;
use worker::{CsvImporter, WorkerScheduler};

use crate::settings::Settings;

/// How often the store health probe reruns while serving.
const STORE_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "analytics-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server and ingest workers (default)
    Serve,
    /// Load events from a CSV file straight into the event store
    Import {
        /// CSV file with header `event_id,occurred_at,user_id,event_type,properties_json`
        path: PathBuf,
        /// Tag stored rows with this batch identifier
        #[arg(long, env = "ANALYTICS_BATCH_KEY")]
        batch_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    // rustls 0.23+ requires explicit crypto provider selection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Import { path, batch_key } => import(settings, path, batch_key).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Starting Analytics Engine v{}", env!("CARGO_PKG_VERSION"));
    info!(
        store = %settings.store.redacted_url(),
        queue = ?settings.queue.backend,
        ingest_workers = settings.worker.ingest_workers,
        "Loaded configuration"
    );

    let store = event_store::open(&settings.store)
        .await
        .context("Failed to open event store")?;
    event_store::health::check_connection(store.as_ref()).await;
    let store_monitor = tokio::spawn(event_store::health::monitor(
        store.clone(),
        STORE_PROBE_INTERVAL,
    ));

    let queue = TaskQueue::open(&settings.queue)
        .await
        .context("Failed to open task queue")?;
    task_queue::health::check_producer(queue.producer.as_ref()).await;

    let dedup = BatchDeduplicator::with_chunk_size(store.clone(), settings.worker.chunk_size);
    let scheduler = Arc::new(WorkerScheduler::new(
        settings.worker.clone(),
        queue.consumer.clone(),
        dedup,
    ));
    let workers = scheduler.start();

    let state = AppState::from_parts(
        store.clone(),
        queue.producer.clone(),
        settings.rate_limit.clone(),
        &settings.analytics,
    );
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Stop intake, then let workers finish what is already queued
    queue.close();
    workers.shutdown(settings.worker.shutdown_grace()).await;
    store_monitor.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn import(settings: Settings, path: PathBuf, batch_key: Option<String>) -> Result<()> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let store = event_store::open(&settings.store)
        .await
        .context("Failed to open event store")?;
    let dedup = BatchDeduplicator::with_chunk_size(store, settings.worker.chunk_size);
    let importer = CsvImporter::new(dedup, batch_key).context("Invalid import options")?;

    info!(path = %path.display(), "Importing events");
    let summary = importer
        .import(BufReader::new(file))
        .await
        .with_context(|| format!("Import of {} failed", path.display()))?;

    info!(
        processed = summary.processed,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Import finished"
    );
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
