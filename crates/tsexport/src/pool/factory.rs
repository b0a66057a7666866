use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, warn};

use crate::error::ExportError;
use crate::storage::{BatchWriter, WriterConfig};

/// Lifecycle hooks an [`ObjectPool`](super::ObjectPool) drives for the
/// objects it manages.
///
/// The pool never holds its own lock while calling into a factory, so hooks
/// are free to take locks of the object itself.
pub trait PooledObjectFactory: Send + Sync + 'static {
    type Object: Send + 'static;

    fn make_object(&self) -> Result<Self::Object, ExportError>;

    /// Retires an object for good. Must release everything the object holds.
    fn destroy_object(&self, object: Self::Object);

    fn validate_object(&self, object: &Self::Object) -> bool;

    /// Called before an object is handed to a borrower.
    fn activate_object(&self, _object: &Self::Object) -> Result<(), ExportError> {
        Ok(())
    }

    /// Called when a borrower gives an object back, before it becomes idle.
    fn passivate_object(&self, _object: &Self::Object) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Creates [`BatchWriter`]s with ids 1, 2, 3, ... sharing one configuration.
#[derive(Debug)]
pub struct BatchWriterFactory {
    config: WriterConfig,
    last_id: AtomicU64,
}

impl BatchWriterFactory {
    pub fn new(config: WriterConfig) -> Self {
        Self::starting_after(config, 0)
    }

    /// Numbers writers from `last_id + 1`, so names already present in the
    /// export directory are never produced again.
    pub fn starting_after(config: WriterConfig, last_id: u64) -> Self {
        Self {
            config,
            last_id: AtomicU64::new(last_id),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}

impl PooledObjectFactory for BatchWriterFactory {
    type Object = BatchWriter;

    fn make_object(&self) -> Result<BatchWriter, ExportError> {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        BatchWriter::open(id, self.config.clone()).map_err(|e| {
            error!("Failed to create writer {id}: {e}");
            ExportError::from(e)
        })
    }

    /// Closing forces the final commit, so no buffered record is lost when a
    /// writer is retired.
    fn destroy_object(&self, writer: BatchWriter) {
        if let Err(e) = writer.close() {
            error!("Error closing writer {}: {e}", writer.id());
        }
    }

    fn validate_object(&self, writer: &BatchWriter) -> bool {
        let healthy = writer.is_healthy();
        if !healthy {
            warn!("Writer {} failed validation", writer.id());
        }
        healthy
    }
}
