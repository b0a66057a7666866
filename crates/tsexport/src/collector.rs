use log::info;

use crate::config::ExporterConfig;
use crate::error::ExportError;
use crate::ingest::IngestionFacade;
use crate::pool::{BatchWriterFactory, WriterPool};
use crate::storage::{DirectoryLock, RecoveryReport, recover_export_directory};

/// A running collector: the claimed export directory plus the writer pool
/// fed through an [`IngestionFacade`].
pub struct Collector {
    config: ExporterConfig,
    facade: IngestionFacade,
    recovery: RecoveryReport,
    _lock: DirectoryLock,
}

impl Collector {
    /// Validates `config`, claims the export directory, publishes whatever a
    /// previous run left behind and builds the pool. Any failure here is
    /// fatal for the process.
    #[tracing::instrument(level = "info", skip(config), fields(dir = %config.export_directory.display()))]
    pub fn start(config: ExporterConfig) -> Result<Self, ExportError> {
        config.validate()?;

        let lock = DirectoryLock::acquire(&config.export_directory)?;
        let recovery = recover_export_directory(&config.export_directory, &config.app)?;

        let factory =
            BatchWriterFactory::starting_after(config.writer_config(), recovery.last_writer_id);
        let pool = WriterPool::new(factory, config.pool_config());
        info!(
            "Collector '{}' exporting to {} (first writer id={}, max_total={}, commit_batch_size={}, max_commit_interval={}ms)",
            config.app,
            config.export_directory.display(),
            recovery.last_writer_id + 1,
            config.max_total,
            config.commit_batch_size,
            config.max_commit_interval_ms
        );

        Ok(Self {
            config,
            facade: IngestionFacade::new(pool),
            recovery,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn facade(&self) -> &IngestionFacade {
        &self.facade
    }

    pub fn pool(&self) -> &WriterPool {
        self.facade.pool()
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Closes the pool so every idle writer commits its file now and every
    /// borrowed writer does so when returned.
    pub fn shutdown(&self) {
        info!("Shutting down collector '{}'", self.config.app);
        self.pool().close();
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.pool().close();
    }
}
