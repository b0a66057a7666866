use log::{error, warn};

use crate::Record;
use crate::error::ExportError;
use crate::pool::WriterPool;

/// Counts for one ingested request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    /// Malformed records skipped without failing the request.
    pub rejected: usize,
}

/// Per-request path from decoded records to a pooled writer.
#[derive(Clone)]
pub struct IngestionFacade {
    pool: WriterPool,
}

impl IngestionFacade {
    pub fn new(pool: WriterPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WriterPool {
        &self.pool
    }

    /// Borrows one writer for the whole batch and appends every valid record.
    ///
    /// Malformed records are skipped and counted. The first append failure
    /// stops the batch and is returned; the writer goes back to the pool on
    /// every path. An empty batch never touches the pool.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn ingest<I>(&self, records: I) -> Result<IngestSummary, ExportError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut summary = IngestSummary::default();
        let mut records = records.into_iter().peekable();
        if records.peek().is_none() {
            return Ok(summary);
        }

        let writer = self.pool.borrow()?;
        for record in records {
            if let Err(e) = record.validate() {
                warn!("Skipping malformed record: {e}");
                summary.rejected += 1;
                continue;
            }
            if let Err(e) = writer.add_record(&record) {
                error!(
                    "Writer {} rejected record of '{}' after {} accepted: {e}",
                    writer.id(),
                    record.metric,
                    summary.accepted
                );
                return Err(e);
            }
            summary.accepted += 1;
        }

        Ok(summary)
    }
}
