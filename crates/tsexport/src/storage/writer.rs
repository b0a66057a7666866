use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::Record;
use crate::error::{ExportError, StorageError};
use crate::storage::common::DataFileName;
use crate::storage::compressor::Compressor;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Prefix of every file name produced by the writer.
    pub app: String,
    pub export_dir: PathBuf,
    /// Record count that triggers a synchronous commit.
    pub commit_batch_size: usize,
    /// Idle period after which a non-empty file is committed by the timer.
    pub max_commit_interval: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            app: crate::config::DEFAULT_APP.to_string(),
            export_dir: PathBuf::from(crate::config::DEFAULT_EXPORT_DIRECTORY),
            commit_batch_size: crate::config::DEFAULT_COMMIT_BATCH_SIZE,
            max_commit_interval: Duration::from_millis(
                crate::config::DEFAULT_MAX_COMMIT_INTERVAL_MS,
            ),
        }
    }
}

/// What caused a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTrigger {
    Threshold,
    IdleTimeout,
    Close,
    Explicit,
    /// Rotation away from a file that a failed write left torn.
    WriteFailure,
}

/// Observable lifecycle of a writer. Committing happens entirely under the
/// writer lock and is never visible from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Accumulating,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub threshold_commits: u64,
    pub idle_commits: u64,
    pub close_commits: u64,
    pub explicit_commits: u64,
    pub write_failure_commits: u64,
    /// Commit attempts that found nothing to commit and only reset the timer.
    pub empty_commits: u64,
    pub files_published: u64,
    pub commit_failures: u64,
}

impl WriterStats {
    pub fn commits(&self) -> u64 {
        self.threshold_commits
            + self.idle_commits
            + self.close_commits
            + self.explicit_commits
            + self.write_failure_commits
    }

    fn record_trigger(&mut self, trigger: CommitTrigger) {
        match trigger {
            CommitTrigger::Threshold => self.threshold_commits += 1,
            CommitTrigger::IdleTimeout => self.idle_commits += 1,
            CommitTrigger::Close => self.close_commits += 1,
            CommitTrigger::Explicit => self.explicit_commits += 1,
            CommitTrigger::WriteFailure => self.write_failure_commits += 1,
        }
    }
}

struct ActiveFile {
    path: PathBuf,
    out: BufWriter<File>,
    /// Bytes of complete lines accepted so far.
    written: u64,
    /// A write failed part way; bytes past `written` are garbage.
    torn: bool,
}

impl ActiveFile {
    fn create(
        config: &WriterConfig,
        writer_id: u64,
        sequence_number: u64,
    ) -> Result<Self, StorageError> {
        let path = DataFileName::new(&config.app, writer_id, sequence_number)
            .path_in(&config.export_dir);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                StorageError::from_io_error(e, &format!("Failed to create {}", path.display()))
            })?;
        debug!("Writer {writer_id} opened {}", path.display());

        Ok(Self {
            path,
            out: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
            written: 0,
            torn: false,
        })
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self.out.write_all(line) {
            Ok(()) => {
                self.written += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                Err(e)
            }
        }
    }

    /// Flushes buffered lines, cuts off a torn tail, syncs and closes the
    /// handle.
    fn finish(self) -> Result<PathBuf, StorageError> {
        let context = format!("closing {}", self.path.display());
        let file = self
            .out
            .into_inner()
            .map_err(|e| StorageError::from_io_error(e.into_error(), &context))?;
        if self.torn {
            file.set_len(self.written)
                .map_err(|e| StorageError::from_io_error(e, &context))?;
            warn!(
                "Truncated torn data file {} to {} bytes",
                self.path.display(),
                self.written
            );
        }
        file.sync_all()
            .map_err(|e| StorageError::from_io_error(e, &context))?;
        Ok(self.path)
    }
}

struct WriterInner {
    sequence_number: u64,
    active: Option<ActiveFile>,
    record_count: usize,
    commit_deadline: Option<Instant>,
    closed: bool,
    stats: WriterStats,
    line: Vec<u8>,
}

struct Shared {
    id: u64,
    config: WriterConfig,
    compressor: Compressor,
    inner: Mutex<WriterInner>,
    timer_signal: Condvar,
}

/// Accumulates records into one open file and commits it (flush, close,
/// compress, rotate) when `commit_batch_size` records are reached or when
/// `max_commit_interval` passes without a commit, whichever comes first.
///
/// Both triggers run under the same lock, so commits never overlap and no
/// append interleaves with a commit. The idle timer runs on a dedicated
/// thread that exits before [`BatchWriter::close`] returns.
pub struct BatchWriter {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BatchWriter {
    #[tracing::instrument(level = "info", skip(config), fields(writer_id = id, dir = %config.export_dir.display()))]
    pub fn open(id: u64, config: WriterConfig) -> Result<Self, StorageError> {
        let active = ActiveFile::create(&config, id, 1)?;
        let first_path = active.path.clone();
        let deadline = Instant::now() + config.max_commit_interval;
        let thread_name = format!("{}-writer-{id}", config.app);

        let shared = Arc::new(Shared {
            id,
            config,
            compressor: Compressor::default(),
            inner: Mutex::new(WriterInner {
                sequence_number: 1,
                active: Some(active),
                record_count: 0,
                commit_deadline: Some(deadline),
                closed: false,
                stats: WriterStats::default(),
                line: Vec::with_capacity(256),
            }),
            timer_signal: Condvar::new(),
        });

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_idle_timer(timer_shared));

        match timer {
            Ok(handle) => Ok(Self {
                shared,
                timer: Mutex::new(Some(handle)),
            }),
            Err(e) => {
                drop(shared);
                let _ = std::fs::remove_file(&first_path);
                Err(StorageError::from_io_error(
                    e,
                    &format!("Failed to start idle timer for writer {id}"),
                ))
            }
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn config(&self) -> &WriterConfig {
        &self.shared.config
    }

    pub fn sequence_number(&self) -> u64 {
        self.shared.inner.lock().sequence_number
    }

    /// Path of the open file, `None` once closed or while no file could be
    /// opened after a failed rotation.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.shared
            .inner
            .lock()
            .active
            .as_ref()
            .map(|active| active.path.clone())
    }

    pub fn record_count(&self) -> usize {
        self.shared.inner.lock().record_count
    }

    pub fn state(&self) -> WriterState {
        if self.shared.inner.lock().closed {
            WriterState::Closed
        } else {
            WriterState::Accumulating
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == WriterState::Closed
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.inner.lock().stats.clone()
    }

    /// A writer is healthy while it is open and its file still exists on disk
    /// and has not been torn by a failed write.
    pub fn is_healthy(&self) -> bool {
        let inner = self.shared.inner.lock();
        !inner.closed
            && inner
                .active
                .as_ref()
                .is_some_and(|active| !active.torn && active.path.exists())
    }

    /// Appends `record` as one JSON line. Reaching `commit_batch_size` commits
    /// the file before returning; a failure of that commit is logged and does
    /// not fail the append.
    #[tracing::instrument(level = "debug", skip(self, record), fields(writer_id = self.shared.id))]
    pub fn add_record(&self, record: &Record) -> Result<(), ExportError> {
        record.validate()?;

        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(ExportError::WriterClosed {
                writer_id: self.shared.id,
            });
        }
        if inner.active.as_ref().is_some_and(|active| active.torn) {
            if let Err(e) = self.shared.rotate_torn(&mut inner) {
                warn!(
                    "Writer {} continues after failed rotation of a torn file: {e}",
                    self.shared.id
                );
            }
        }
        if inner.active.is_none() {
            self.shared.reopen(&mut inner)?;
        }

        self.shared.append(&mut inner, record)?;

        if inner.record_count >= self.shared.config.commit_batch_size {
            if let Err(e) = self.shared.commit(&mut inner, CommitTrigger::Threshold) {
                warn!(
                    "Writer {} continues after failed threshold commit: {e}",
                    self.shared.id
                );
            }
        }
        Ok(())
    }

    /// Commits the open file now. A no-op that only resets the idle timer
    /// when nothing has been appended since the last commit.
    pub fn commit(&self) -> Result<(), ExportError> {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(ExportError::WriterClosed {
                writer_id: self.shared.id,
            });
        }
        self.shared
            .commit(&mut inner, CommitTrigger::Explicit)
            .map_err(ExportError::from)
    }

    /// Forces a final commit, stops the idle timer and releases the file.
    /// An empty open file is deleted instead of published. Calling `close`
    /// again is a no-op.
    #[tracing::instrument(level = "info", skip(self), fields(writer_id = self.shared.id))]
    pub fn close(&self) -> Result<(), ExportError> {
        let result = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            inner.commit_deadline = None;
            self.shared.timer_signal.notify_all();

            let result = if inner.record_count > 0 {
                inner.stats.record_trigger(CommitTrigger::Close);
                self.shared.publish_active(&mut inner).map(|_| ())
            } else {
                discard_empty(inner.active.take());
                Ok(())
            };
            inner.record_count = 0;
            result
        };

        if let Some(handle) = self.timer.lock().take() {
            if handle.join().is_err() {
                error!("Idle timer of writer {} panicked", self.shared.id);
            }
        }
        info!("Writer {} closed", self.shared.id);

        result.map_err(ExportError::from)
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Writer {} failed to close cleanly: {e}", self.shared.id);
        }
    }
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("id", &self.shared.id)
            .field("app", &self.shared.config.app)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn append(&self, inner: &mut WriterInner, record: &Record) -> Result<(), StorageError> {
        let WriterInner { active, line, .. } = inner;
        let Some(active) = active.as_mut() else {
            return Err(self.unavailable());
        };

        line.clear();
        serde_json::to_writer(&mut *line, record).map_err(|e| {
            StorageError::from_serialization_error(
                e,
                &format!("encoding into {}", active.path.display()),
            )
        })?;
        line.push(b'\n');

        if let Err(e) = active.write_line(line.as_slice()) {
            error!(
                "Error: {e} occurred when writing metric {} to file {}",
                record.metric,
                active.path.display()
            );
            return Err(StorageError::from_io_error(
                e,
                &format!("writing {}", active.path.display()),
            ));
        }

        inner.record_count += 1;
        inner.stats.records_written += 1;
        Ok(())
    }

    /// Commit under the writer lock. The sequence number advances only after
    /// the previous file has been handed off, whether or not compression
    /// succeeded, so a left-behind file is never reopened.
    fn commit(
        &self,
        inner: &mut WriterInner,
        trigger: CommitTrigger,
    ) -> Result<(), StorageError> {
        if inner.record_count == 0 {
            inner.stats.empty_commits += 1;
            self.restart_timer(inner);
            return Ok(());
        }

        inner.commit_deadline = None;
        inner.stats.record_trigger(trigger);
        debug!(
            "Writer {} committing {} records ({trigger:?})",
            self.id, inner.record_count
        );

        let published = self.publish_active(inner);

        inner.sequence_number += 1;
        inner.record_count = 0;
        let reopened = self.reopen(inner);

        published.and(reopened)
    }

    /// Moves past a file whose last write failed. Complete lines in it are
    /// still published; an empty one is discarded.
    fn rotate_torn(&self, inner: &mut WriterInner) -> Result<(), StorageError> {
        if inner.record_count > 0 {
            return self.commit(inner, CommitTrigger::WriteFailure);
        }
        discard_empty(inner.active.take());
        inner.sequence_number += 1;
        self.reopen(inner)
    }

    #[tracing::instrument(level = "info", skip(self, inner), fields(writer_id = self.id, sequence = inner.sequence_number))]
    fn publish_active(&self, inner: &mut WriterInner) -> Result<PathBuf, StorageError> {
        let Some(active) = inner.active.take() else {
            return Err(self.unavailable());
        };

        let result = active
            .finish()
            .and_then(|path| self.compressor.compress(&path));
        match &result {
            Ok(_) => inner.stats.files_published += 1,
            Err(e) => {
                inner.stats.commit_failures += 1;
                error!(
                    "Error: {e} occurred when committing data file of writer {} (sequence {})",
                    self.id, inner.sequence_number
                );
            }
        }
        result
    }

    fn reopen(&self, inner: &mut WriterInner) -> Result<(), StorageError> {
        match ActiveFile::create(&self.config, self.id, inner.sequence_number) {
            Ok(active) => {
                inner.active = Some(active);
                self.restart_timer(inner);
                Ok(())
            }
            Err(e) => {
                error!("Writer {} failed to open a new data file: {e}", self.id);
                Err(e)
            }
        }
    }

    fn restart_timer(&self, inner: &mut WriterInner) {
        inner.commit_deadline = Some(Instant::now() + self.config.max_commit_interval);
        self.timer_signal.notify_all();
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable {
            context: format!("writer {} has no open file", self.id),
        }
    }
}

fn run_idle_timer(shared: Arc<Shared>) {
    let mut inner = shared.inner.lock();
    loop {
        if inner.closed {
            break;
        }
        match inner.commit_deadline {
            Some(deadline) if Instant::now() >= deadline => {
                debug!("Commit timeout for writer {}", shared.id);
                if let Err(e) = shared.commit(&mut inner, CommitTrigger::IdleTimeout) {
                    warn!("Writer {} continues after failed idle commit: {e}", shared.id);
                }
            }
            Some(deadline) => {
                shared.timer_signal.wait_until(&mut inner, deadline);
            }
            None => shared.timer_signal.wait(&mut inner),
        }
    }
    debug!("Idle timer of writer {} stopped", shared.id);
}

fn discard_empty(active: Option<ActiveFile>) {
    if let Some(active) = active {
        let ActiveFile { path, out, .. } = active;
        drop(out);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove empty data file {}: {e}", path.display());
        }
    }
}
