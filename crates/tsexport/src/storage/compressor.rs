use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{info, warn};

use crate::error::StorageError;
use crate::storage::common::{compressed_path, compressing_path, sync_parent_directory};

/// Gzip-compresses finalized batch files and publishes them atomically.
///
/// The compressed stream is written to `<name>.gz.compressing` and linked to
/// `<name>.gz` only once it is complete and synced, so an observer of the
/// export directory either sees no `.gz` file or a whole gzip stream. An
/// existing `<name>.gz` is never replaced.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Publishes `path` as `path.gz` and removes `path`.
    ///
    /// On failure the source file is left untouched and no temporary file
    /// remains. Fails without touching it when `path.gz` already exists.
    #[tracing::instrument(level = "info", skip(self), fields(file = %path.display()))]
    pub fn compress(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let target = compressed_path(path);
        let temporary = compressing_path(path);

        if let Err(e) = self.write_compressed_copy(path, &temporary) {
            remove_if_present(&temporary);
            return Err(e);
        }

        let published = fs::hard_link(&temporary, &target);
        remove_if_present(&temporary);
        if let Err(e) = published {
            let context = if e.kind() == io::ErrorKind::AlreadyExists {
                format!("Refusing to replace published {}", target.display())
            } else {
                format!("Failed to publish {}", target.display())
            };
            return Err(StorageError::from_io_error(e, &context));
        }
        sync_parent_directory(&target);

        if let Err(e) = fs::remove_file(path) {
            warn!(
                "Error: {e} occurred when deleting the source data file {}",
                path.display()
            );
        }

        info!("{} is saved", target.display());
        Ok(target)
    }

    fn write_compressed_copy(&self, source: &Path, temporary: &Path) -> Result<(), StorageError> {
        let source_file = File::open(source).map_err(|e| {
            StorageError::from_read_error(e, &format!("Failed to open {}", source.display()))
        })?;
        let mut reader = BufReader::new(source_file);

        let temporary_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temporary)
            .map_err(|e| {
                StorageError::from_io_error(
                    e,
                    &format!("Failed to create temp file {}", temporary.display()),
                )
            })?;

        let context = format!("compressing {}", source.display());
        let mut encoder = GzEncoder::new(BufWriter::new(temporary_file), self.level);
        io::copy(&mut reader, &mut encoder)
            .map_err(|e| StorageError::from_compression_error(e, &context))?;
        let buffered = encoder
            .finish()
            .map_err(|e| StorageError::from_compression_error(e, &context))?;
        let temporary_file = buffered
            .into_inner()
            .map_err(|e| StorageError::from_io_error(e.into_error(), &context))?;
        temporary_file
            .sync_all()
            .map_err(|e| StorageError::from_io_error(e, &context))
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}
