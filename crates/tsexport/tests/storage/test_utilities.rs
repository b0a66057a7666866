use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use tsexport::storage::DataFileName;
use tsexport::{Record, WriterConfig};
use uuid::Uuid;

pub const TEST_APP: &str = "master";

/// Generate a unique test ID for isolating test data
pub fn generate_test_id() -> String {
    Uuid::new_v4().to_string().replace('-', "")
}

/// Create a temporary directory for testing using tempdir()
pub fn create_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("tsexport_{prefix}_{}_", generate_test_id()))
        .tempdir()
        .expect("Failed to create temporary directory")
}

pub fn test_record(i: usize) -> Record {
    Record::new("sys_cpu_usage", 1_504_779_771_421 + i as i64, i as f64)
        .with_tag("host", "web001")
        .with_tag("dc", "上海秋实")
}

pub fn writer_config(dir: &Path, commit_batch_size: usize, interval: Duration) -> WriterConfig {
    WriterConfig {
        app: TEST_APP.to_string(),
        export_dir: dir.to_path_buf(),
        commit_batch_size,
        max_commit_interval: interval,
    }
}

fn sorted_entries(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("readable test directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(&keep)
        })
        .collect();
    paths.sort();
    paths
}

/// Published `.gz` batch files in `dir`.
pub fn published_files(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir, |name| name.ends_with(".gz"))
}

/// Uncompressed batch files in `dir`, open or left behind.
pub fn data_files(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir, |name| DataFileName::parse(name, TEST_APP).is_some())
}

pub fn temporary_files(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir, |name| name.ends_with(".gz.compressing"))
}

pub fn read_published(path: &Path) -> Vec<Record> {
    let file = File::open(path).expect("published file exists");
    BufReader::new(GzDecoder::new(file))
        .lines()
        .map(|line| serde_json::from_str(&line.expect("valid gzip stream")).expect("json line"))
        .collect()
}

pub fn read_all_published(dir: &Path) -> Vec<Record> {
    published_files(dir)
        .iter()
        .flat_map(|path| read_published(path))
        .collect()
}

/// Sequence number encoded in a published or open file name.
pub fn sequence_of(path: &Path) -> u64 {
    let name = path.file_name().and_then(|n| n.to_str()).expect("utf-8 name");
    let name = name.strip_suffix(".gz").unwrap_or(name);
    DataFileName::parse(name, TEST_APP)
        .expect("batch file name")
        .sequence_number
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Common test configuration
pub struct TestConfig {
    pub temp_dir: tempfile::TempDir,
}

impl TestConfig {
    pub fn new(prefix: &str) -> Self {
        Self {
            temp_dir: create_test_dir(prefix),
        }
    }

    /// Get the path to the temporary directory
    pub fn temp_dir_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn writer_config(&self, commit_batch_size: usize, interval: Duration) -> WriterConfig {
        writer_config(self.temp_dir_path(), commit_batch_size, interval)
    }
}

// TempDir automatically cleans up on drop, no manual cleanup needed
