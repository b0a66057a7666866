use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::StorageError;
use crate::storage::common::{COMPRESSING_SUFFIX, DataFileName, compressed_path};
use crate::storage::compressor::Compressor;

/// Outcome of [`recover_export_directory`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Leftover data files compressed and published.
    pub compressed: usize,
    /// `.gz.compressing` files from an interrupted compression.
    pub removed_temporaries: usize,
    /// Leftover data files with no records.
    pub removed_empty: usize,
    /// Data files whose `.gz` had already been published.
    pub removed_published: usize,
    pub failed: usize,
    /// Highest writer id in any `<app>-...` name found, published or not.
    /// New writers must be numbered above it.
    pub last_writer_id: u64,
}

/// Finishes the work a previous process left behind in `dir`.
///
/// Must run before any writer opens a file in `dir`: every uncompressed file
/// named `<app>-...` is treated as abandoned. Individual failures are logged
/// and counted; only an unreadable directory is an error.
#[tracing::instrument(level = "info", skip(dir), fields(dir = %dir.display()))]
pub fn recover_export_directory(dir: &Path, app: &str) -> Result<RecoveryReport, StorageError> {
    let mut report = RecoveryReport::default();
    let compressor = Compressor::default();

    let entries = fs::read_dir(dir).map_err(|e| {
        StorageError::from_read_error(e, &format!("Failed to scan {}", dir.display()))
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(name) = DataFileName::parse_any(file_name, app) {
            report.last_writer_id = report.last_writer_id.max(name.writer_id);
        }

        if file_name.starts_with(app) && file_name.ends_with(COMPRESSING_SUFFIX) {
            match fs::remove_file(&path) {
                Ok(()) => report.removed_temporaries += 1,
                Err(e) => {
                    warn!("Failed to remove stale {}: {e}", path.display());
                    report.failed += 1;
                }
            }
            continue;
        }

        if DataFileName::parse(file_name, app).is_none() {
            continue;
        }

        if compressed_path(&path).exists() {
            match fs::remove_file(&path) {
                Ok(()) => report.removed_published += 1,
                Err(e) => {
                    warn!("Failed to remove published source {}: {e}", path.display());
                    report.failed += 1;
                }
            }
            continue;
        }

        let is_empty = entry.metadata().map(|m| m.len() == 0).unwrap_or(false);
        if is_empty {
            match fs::remove_file(&path) {
                Ok(()) => report.removed_empty += 1,
                Err(e) => {
                    warn!("Failed to remove empty {}: {e}", path.display());
                    report.failed += 1;
                }
            }
            continue;
        }

        match compressor.compress(&path) {
            Ok(published) => {
                info!("Recovered {}", published.display());
                report.compressed += 1;
            }
            Err(e) => {
                warn!("Failed to recover {}: {e}", path.display());
                report.failed += 1;
            }
        }
    }

    info!(
        "Recovery of {}: {} compressed, {} temporaries removed, {} empty removed, {} failed, last writer id {}",
        dir.display(),
        report.compressed,
        report.removed_temporaries,
        report.removed_empty,
        report.failed,
        report.last_writer_id
    );
    Ok(report)
}
