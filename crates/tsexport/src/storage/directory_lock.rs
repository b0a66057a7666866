use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use log::warn;
use sysinfo::{ProcessesToUpdate, System};

use crate::error::StorageError;

pub const LOCK_FILE_NAME: &str = ".tsexport.lock";

/// Exclusive claim on an export directory.
///
/// Batch file names are unique only within one process, so two collectors
/// must never write into the same directory. Taking the lock also proves the
/// directory is writable. The lock file is removed on drop.
#[derive(Debug)]
pub struct DirectoryLock {
    path: PathBuf,
    _file: File,
}

impl DirectoryLock {
    #[tracing::instrument(level = "info", skip(dir), fields(dir = %dir.display()))]
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        if !dir.is_dir() {
            return Err(StorageError::Unavailable {
                context: format!("export directory {} does not exist", dir.display()),
            });
        }

        let lock_path = dir.join(LOCK_FILE_NAME);
        let lock_file = create_lock_file(&lock_path)?;

        match attempt_to_acquire_lock(&lock_file) {
            Ok(()) => {
                write_lock_metadata(&lock_file)?;
                Ok(Self {
                    path: lock_path,
                    _file: lock_file,
                })
            }
            Err(StorageError::LockAcquisitionFailed) => handle_lock_conflict(&lock_path),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove lock file {:?}: {e}", self.path);
            }
        }
    }
}

fn create_lock_file(lock_path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| StorageError::from_io_error(e, "Failed to create lock file"))
}

fn attempt_to_acquire_lock(lock_file: &File) -> Result<(), StorageError> {
    match lock_file.try_lock_exclusive() {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(StorageError::LockAcquisitionFailed),
    }
}

fn write_lock_metadata(lock_file: &File) -> Result<(), StorageError> {
    let pid = std::process::id();
    let timestamp = chrono::Utc::now().to_rfc3339();
    let lock_info = format!("PID: {pid}\nTimestamp: {timestamp}\n");

    let _ = lock_file.set_len(0);
    (&*lock_file)
        .write_all(lock_info.as_bytes())
        .map_err(|e| StorageError::from_io_error(e, "Failed to write lock metadata"))
}

/// The flock is still held, so its holder is alive whatever the file says.
/// A dead holder releases the flock with its process and never gets here;
/// its leftover file is simply relocked by [`DirectoryLock::acquire`].
fn handle_lock_conflict(lock_path: &Path) -> Result<DirectoryLock, StorageError> {
    let pid = extract_pid_from_lock_file(lock_path);
    if let Some(pid) = pid {
        if pid != std::process::id() && !is_process_alive(pid) {
            warn!(
                "Lock file {} names PID {pid}, which is not running, but its lock is held",
                lock_path.display()
            );
        }
    }
    Err(StorageError::DirectoryLocked {
        context: "Export directory is already in use by another collector".to_string(),
        pid,
    })
}

fn extract_pid_from_lock_file(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path).ok().and_then(|content| {
        content
            .lines()
            .find(|line| line.starts_with("PID:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|pid_str| pid_str.parse::<u32>().ok())
    })
}

fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, false);
    system
        .processes()
        .get(&sysinfo::Pid::from(pid as usize))
        .is_some()
}
