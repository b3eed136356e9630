//! Background workers for the analytics engine.
//!
//! - Coordinator (admission → task dispatch)
//! - Ingest workers (task queue → event store pipeline)
//! - Scheduler (worker pool + metrics reporter)
//! - Bulk CSV import

pub mod config;
pub mod coordinator;
pub mod import;
pub mod ingest;
pub mod scheduler;

pub use config::WorkerConfig;
pub use coordinator::{IngestionCoordinator, SubmitReceipt, SubmitStatus};
pub use import::{CsvImporter, ImportError, ImportSummary};
pub use ingest::IngestWorker;
pub use scheduler::{WorkerHandles, WorkerScheduler};
