use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ExportError;
use crate::pool::PoolConfig;
use crate::storage::WriterConfig;

pub const DEFAULT_APP: &str = "tsexport";
pub const DEFAULT_EXPORT_DIRECTORY: &str = "./export";
pub const DEFAULT_MAX_TOTAL: usize = 2;
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_MAX_COMMIT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1234";

/// What `borrow` does when `max_total` writers are already in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenExhausted {
    /// Wait for a writer to be returned, optionally bounded by `max_wait`.
    #[default]
    Block,
    /// Fail immediately with a capacity error.
    Fail,
}

/// Process-wide settings for the collector, loadable from YAML.
///
/// ```yaml
/// app: master
/// export_directory: /var/lib/tsexport
/// max_total: 4
/// commit_batch_size: 50000
/// max_commit_interval_ms: 10000
/// when_exhausted: fail
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub app: String,
    pub export_directory: PathBuf,
    pub max_total: usize,
    pub max_idle: Option<usize>,
    pub commit_batch_size: usize,
    pub max_commit_interval_ms: u64,
    pub when_exhausted: WhenExhausted,
    pub max_wait_ms: Option<u64>,
    pub listen_addr: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP.to_string(),
            export_directory: PathBuf::from(DEFAULT_EXPORT_DIRECTORY),
            max_total: DEFAULT_MAX_TOTAL,
            max_idle: None,
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            max_commit_interval_ms: DEFAULT_MAX_COMMIT_INTERVAL_MS,
            when_exhausted: WhenExhausted::Block,
            max_wait_ms: None,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl ExporterConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ExportError> {
        serde_yaml::from_str(contents).map_err(|e| ExportError::config("yaml", e.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExportError::config("config", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn max_commit_interval(&self) -> Duration {
        Duration::from_millis(self.max_commit_interval_ms)
    }

    /// Checks every option and that the export directory already exists.
    /// Writability is proven later when the directory lock is taken.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.app.is_empty() || self.app.contains(['/', '\\']) {
            return Err(ExportError::config(
                "app",
                "must be non-empty and contain no path separators",
            ));
        }
        if self.max_total == 0 {
            return Err(ExportError::config("max_total", "must be > 0"));
        }
        if let Some(max_idle) = self.max_idle {
            if max_idle > self.max_total {
                return Err(ExportError::config(
                    "max_idle",
                    format!("{max_idle} exceeds max_total {}", self.max_total),
                ));
            }
        }
        if self.commit_batch_size == 0 {
            return Err(ExportError::config("commit_batch_size", "must be > 0"));
        }
        if self.max_commit_interval_ms == 0 {
            return Err(ExportError::config("max_commit_interval_ms", "must be > 0"));
        }
        if !self.export_directory.is_dir() {
            return Err(ExportError::config(
                "export_directory",
                format!(
                    "{} does not exist or is not a directory",
                    self.export_directory.display()
                ),
            ));
        }
        Ok(())
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            app: self.app.clone(),
            export_dir: self.export_directory.clone(),
            commit_batch_size: self.commit_batch_size,
            max_commit_interval: self.max_commit_interval(),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_total: self.max_total,
            max_idle: self.max_idle.unwrap_or(self.max_total),
            when_exhausted: self.when_exhausted,
            max_wait: self.max_wait_ms.map(Duration::from_millis),
            ..PoolConfig::default()
        }
    }
}
