use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;

/// Extension appended to a published, compressed batch file.
pub const GZ_SUFFIX: &str = ".gz";
/// Suffix of a compressed copy that has not been renamed into place yet.
pub const COMPRESSING_SUFFIX: &str = ".gz.compressing";

const CREATED_AT_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

// ================================================================================================
// DATA FILE NAMES
// ================================================================================================

/// Name of an uncompressed batch file: `<app>-<writerId>-<sequenceNumber>-<createdAt>`.
///
/// The (writer id, sequence number) pair is unique within an export
/// directory: a collector numbers its writers after the highest id already
/// present there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileName {
    pub app: String,
    pub writer_id: u64,
    pub sequence_number: u64,
    pub created_at: DateTime<Utc>,
}

impl DataFileName {
    pub fn new(app: &str, writer_id: u64, sequence_number: u64) -> Self {
        Self {
            app: app.to_string(),
            writer_id,
            sequence_number,
            created_at: Utc::now(),
        }
    }

    /// Parses a bare file name produced for `app`. Compressed or temporary
    /// names are not data file names and yield `None`.
    pub fn parse(file_name: &str, app: &str) -> Option<Self> {
        let rest = file_name.strip_prefix(app)?.strip_prefix('-')?;
        let mut parts = rest.splitn(3, '-');
        let writer_id = parts.next()?.parse::<u64>().ok()?;
        let sequence_number = parts.next()?.parse::<u64>().ok()?;
        let created_at = NaiveDateTime::parse_from_str(parts.next()?, CREATED_AT_FORMAT)
            .ok()?
            .and_utc();

        Some(Self {
            app: app.to_string(),
            writer_id,
            sequence_number,
            created_at,
        })
    }

    /// Like [`DataFileName::parse`], but also accepts the published `.gz`
    /// and the `.gz.compressing` forms of a data file name.
    pub fn parse_any(file_name: &str, app: &str) -> Option<Self> {
        let base = file_name
            .strip_suffix(COMPRESSING_SUFFIX)
            .or_else(|| file_name.strip_suffix(GZ_SUFFIX))
            .unwrap_or(file_name);
        Self::parse(base, app)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }
}

impl fmt::Display for DataFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.app,
            self.writer_id,
            self.sequence_number,
            self.created_at.format(CREATED_AT_FORMAT)
        )
    }
}

// ================================================================================================
// FILE I/O UTILITIES
// ================================================================================================

pub fn compressed_path(path: &Path) -> PathBuf {
    with_suffix(path, GZ_SUFFIX)
}

pub fn compressing_path(path: &Path) -> PathBuf {
    with_suffix(path, COMPRESSING_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Makes a completed rename durable. Directories cannot be opened for sync
/// on every platform, so failures are only logged.
pub fn sync_parent_directory(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    match File::open(parent).and_then(|dir| dir.sync_all()) {
        Ok(()) => {}
        Err(e) => debug!("Failed to sync directory {}: {e}", parent.display()),
    }
}
