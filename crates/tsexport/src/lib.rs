pub mod collector;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pool;
pub mod record;
pub mod storage;
pub mod telemetry;

pub use collector::Collector;
pub use config::{ExporterConfig, WhenExhausted};
pub use error::{ExportError, RecordError, StorageError};
pub use ingest::{IngestSummary, IngestionFacade};
pub use pool::{BatchWriterFactory, PoolConfig, WriterPool};
pub use record::Record;
pub use storage::{BatchWriter, CommitTrigger, WriterConfig};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
