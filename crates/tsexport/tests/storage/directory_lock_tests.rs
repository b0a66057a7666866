use test_log::test;
use tsexport::StorageError;
use tsexport::storage::DirectoryLock;
use tsexport::storage::directory_lock::LOCK_FILE_NAME;

use super::test_utilities::*;

#[test]
fn test_lock_records_owner_pid() {
    let config = TestConfig::new("lock_pid");

    let lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();

    assert_eq!(lock.path(), config.temp_dir_path().join(LOCK_FILE_NAME));
    let contents = std::fs::read_to_string(lock.path()).unwrap();
    assert!(contents.contains(&format!("PID: {}", std::process::id())));
}

#[test]
fn test_second_lock_on_same_directory_fails() {
    let config = TestConfig::new("lock_conflict");
    let _lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();

    let err = DirectoryLock::acquire(config.temp_dir_path()).unwrap_err();

    assert_eq!(
        err,
        StorageError::DirectoryLocked {
            context: "Export directory is already in use by another collector".to_string(),
            pid: Some(std::process::id()),
        }
    );
}

#[test]
fn test_held_lock_without_readable_pid_is_not_taken_over() {
    let config = TestConfig::new("lock_unreadable_pid");
    let lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(lock.path())
        .unwrap()
        .set_len(0)
        .unwrap();

    let err = DirectoryLock::acquire(config.temp_dir_path()).unwrap_err();

    assert_eq!(
        err,
        StorageError::DirectoryLocked {
            context: "Export directory is already in use by another collector".to_string(),
            pid: None,
        }
    );
    assert!(lock.path().exists());
}

#[test]
fn test_held_lock_naming_dead_pid_is_not_taken_over() {
    let config = TestConfig::new("lock_dead_pid_held");
    let lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();
    std::fs::write(lock.path(), "PID: 4294967\nTimestamp: 2017-09-14T15:03:51Z\n").unwrap();

    let err = DirectoryLock::acquire(config.temp_dir_path()).unwrap_err();

    assert!(matches!(
        err,
        StorageError::DirectoryLocked {
            pid: Some(4294967),
            ..
        }
    ));
}

#[test]
fn test_lock_is_released_on_drop() {
    let config = TestConfig::new("lock_release");
    let lock_path = config.temp_dir_path().join(LOCK_FILE_NAME);

    {
        let _lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();
        assert!(lock_path.exists());
    }
    assert!(!lock_path.exists());

    let _again = DirectoryLock::acquire(config.temp_dir_path()).unwrap();
}

#[test]
fn test_stale_lock_file_is_taken_over() {
    let config = TestConfig::new("lock_stale");
    let lock_path = config.temp_dir_path().join(LOCK_FILE_NAME);
    std::fs::write(&lock_path, "PID: 4294967\nTimestamp: 2017-09-14T15:03:51Z\n").unwrap();

    let _lock = DirectoryLock::acquire(config.temp_dir_path()).unwrap();

    let contents = std::fs::read_to_string(&lock_path).unwrap();
    assert!(contents.contains(&format!("PID: {}", std::process::id())));
}

#[test]
fn test_missing_directory_is_unavailable() {
    let config = TestConfig::new("lock_missing");
    let missing = config.temp_dir_path().join("nope");

    assert!(matches!(
        DirectoryLock::acquire(&missing),
        Err(StorageError::Unavailable { .. })
    ));
}
