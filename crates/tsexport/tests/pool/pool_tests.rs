use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use test_log::test;
use tsexport::pool::{ObjectPool, PoolConfig, PooledObjectFactory};
use tsexport::{BatchWriterFactory, ExportError, WhenExhausted, WriterPool};

use crate::storage::test_utilities::*;

struct Connection {
    id: u64,
    healthy: Arc<AtomicBool>,
}

#[derive(Default)]
struct ConnectionFactory {
    next_id: AtomicU64,
    made: AtomicUsize,
    destroyed: AtomicUsize,
}

impl PooledObjectFactory for ConnectionFactory {
    type Object = Connection;

    fn make_object(&self) -> Result<Connection, ExportError> {
        self.made.fetch_add(1, Ordering::SeqCst);
        Ok(Connection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            healthy: Arc::new(AtomicBool::new(true)),
        })
    }

    fn destroy_object(&self, _object: Connection) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn validate_object(&self, object: &Connection) -> bool {
        object.healthy.load(Ordering::SeqCst)
    }
}

fn pool_config(max_total: usize, when_exhausted: WhenExhausted) -> PoolConfig {
    PoolConfig {
        max_total,
        max_idle: max_total,
        when_exhausted,
        ..PoolConfig::default()
    }
}

fn connection_pool(config: PoolConfig) -> ObjectPool<ConnectionFactory> {
    ObjectPool::new(ConnectionFactory::default(), config)
}

#[test]
fn test_returned_object_is_reused() {
    let pool = connection_pool(pool_config(2, WhenExhausted::Fail));

    let first_id = pool.borrow().unwrap().id;
    let second_id = pool.borrow().unwrap().id;

    assert_eq!(first_id, second_id);
    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.borrowed, 2);
    assert_eq!(stats.returned, 2);
    assert_eq!(stats.num_active, 0);
    assert_eq!(stats.num_idle, 1);
}

#[test]
fn test_fail_policy_rejects_borrow_beyond_max_total() {
    let pool = connection_pool(pool_config(2, WhenExhausted::Fail));
    let first = pool.borrow().unwrap();
    let _second = pool.borrow().unwrap();

    let err = pool.borrow().unwrap_err();
    assert_eq!(err, ExportError::PoolExhausted { max_total: 2 });
    assert!(err.is_capacity_error());

    drop(first);
    assert!(pool.borrow().is_ok());
    assert_eq!(pool.factory().made.load(Ordering::SeqCst), 2);
}

#[test]
fn test_borrowed_guard_debug_output() {
    let pool = connection_pool(pool_config(1, WhenExhausted::Fail));
    let held = pool.borrow().unwrap();

    let rendered = format!("{held:?}");
    assert!(rendered.starts_with("Pooled"));
    assert!(rendered.contains("held: true"));

    let err = pool.borrow().unwrap_err();
    assert_eq!(err, ExportError::PoolExhausted { max_total: 1 });
}

#[test]
fn test_block_policy_waits_for_return() {
    let pool = connection_pool(pool_config(1, WhenExhausted::Block));
    let held = pool.borrow().unwrap();
    let held_id = held.id;

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let borrowed = waiter_pool.borrow().map(|c| c.id);
        tx.send(borrowed).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(held);

    let borrowed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(borrowed, Ok(held_id));
    waiter.join().unwrap();
}

#[test]
fn test_block_policy_times_out() {
    let pool = connection_pool(PoolConfig {
        max_wait: Some(Duration::from_millis(50)),
        ..pool_config(1, WhenExhausted::Block)
    });
    let _held = pool.borrow().unwrap();

    let started = Instant::now();
    let err = pool.borrow().unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(err, ExportError::PoolTimeout { .. }));
    assert!(err.is_capacity_error());
}

#[test]
fn test_concurrent_borrowers_never_exceed_max_total() {
    let max_total = 3;
    let pool = connection_pool(pool_config(max_total, WhenExhausted::Block));
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..max_total + 5)
        .map(|_| {
            let pool = pool.clone();
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _connection = pool.borrow().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(pool.num_active() <= max_total);
                    thread::yield_now();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= max_total);
    let stats = pool.stats();
    assert!(stats.created <= max_total as u64);
    assert_eq!(stats.borrowed, 50 * (max_total as u64 + 5));
    assert_eq!(stats.num_active, 0);
}

#[test]
fn test_concurrent_fail_policy_admits_exactly_max_total() {
    let max_total = 2;
    let pool = connection_pool(pool_config(max_total, WhenExhausted::Fail));
    let (tx, rx) = mpsc::channel();
    let release = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..max_total + 3)
        .map(|_| {
            let pool = pool.clone();
            let tx = tx.clone();
            let release = Arc::clone(&release);
            thread::spawn(move || {
                let borrowed = pool.borrow();
                tx.send(borrowed.is_ok()).unwrap();
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
                drop(borrowed);
            })
        })
        .collect();
    drop(tx);

    let outcomes: Vec<bool> = rx.iter().take(max_total + 3).collect();
    release.store(true, Ordering::SeqCst);
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), max_total);
    assert_eq!(outcomes.iter().filter(|ok| !**ok).count(), 3);
}

#[test]
fn test_invalid_idle_object_is_destroyed_on_borrow() {
    let pool = connection_pool(pool_config(1, WhenExhausted::Fail));
    let borrowed = pool.borrow().unwrap();
    let first_id = borrowed.id;
    borrowed.healthy.store(false, Ordering::SeqCst);
    drop(borrowed);

    let replacement = pool.borrow().unwrap();

    assert_ne!(replacement.id, first_id);
    let stats = pool.stats();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.destroyed, 1);
    assert_eq!(pool.factory().destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validation_on_return_destroys_broken_object() {
    let pool = connection_pool(PoolConfig {
        test_on_return: true,
        ..pool_config(2, WhenExhausted::Fail)
    });
    let borrowed = pool.borrow().unwrap();
    borrowed.healthy.store(false, Ordering::SeqCst);
    drop(borrowed);

    assert_eq!(pool.num_idle(), 0);
    assert_eq!(pool.num_active(), 0);
    assert_eq!(pool.stats().destroyed, 1);
}

#[test]
fn test_invalidate_destroys_instead_of_returning() {
    let pool = connection_pool(pool_config(1, WhenExhausted::Fail));

    pool.borrow().unwrap().invalidate();

    let stats = pool.stats();
    assert_eq!(stats.destroyed, 1);
    assert_eq!(stats.num_idle, 0);
    assert_eq!(stats.num_active, 0);
    assert!(pool.borrow().is_ok());
}

#[test]
fn test_returns_beyond_max_idle_are_destroyed() {
    let pool = connection_pool(PoolConfig {
        max_idle: 1,
        ..pool_config(3, WhenExhausted::Fail)
    });

    let borrowed: Vec<_> = (0..3).map(|_| pool.borrow().unwrap()).collect();
    drop(borrowed);

    let stats = pool.stats();
    assert_eq!(stats.num_idle, 1);
    assert_eq!(stats.destroyed, 2);
    assert_eq!(stats.num_active, 0);
}

#[test]
fn test_close_destroys_idle_and_late_returns() {
    let pool = connection_pool(pool_config(2, WhenExhausted::Fail));
    let held = pool.borrow().unwrap();
    drop(pool.borrow().unwrap());
    assert_eq!(pool.num_idle(), 1);

    pool.close();
    pool.close();

    assert!(pool.is_closed());
    assert_eq!(pool.num_idle(), 0);
    assert_eq!(pool.factory().destroyed.load(Ordering::SeqCst), 1);
    assert!(matches!(pool.borrow(), Err(ExportError::PoolClosed)));

    drop(held);
    assert_eq!(pool.factory().destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.num_active(), 0);
}

#[test]
fn test_close_wakes_blocked_borrowers() {
    let pool = connection_pool(pool_config(1, WhenExhausted::Block));
    let _held = pool.borrow().unwrap();

    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || waiter_pool.borrow().map(|c| c.id));
    thread::sleep(Duration::from_millis(50));
    pool.close();

    assert_eq!(waiter.join().unwrap(), Err(ExportError::PoolClosed));
}

#[test]
fn test_writer_pool_assigns_sequential_ids() {
    let config = TestConfig::new("pool_writer_ids");
    let factory = BatchWriterFactory::new(config.writer_config(100, Duration::from_secs(3600)));
    let pool = WriterPool::new(factory, pool_config(2, WhenExhausted::Fail));

    let first = pool.borrow().unwrap();
    let second = pool.borrow().unwrap();

    let mut ids = vec![first.id(), second.id()];
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_writer_with_deleted_file_is_replaced() {
    let config = TestConfig::new("pool_writer_invalid");
    let factory = BatchWriterFactory::new(config.writer_config(100, Duration::from_secs(3600)));
    let pool = WriterPool::new(factory, pool_config(1, WhenExhausted::Fail));

    {
        let writer = pool.borrow().unwrap();
        std::fs::remove_file(writer.current_file().unwrap()).unwrap();
    }

    let writer = pool.borrow().unwrap();
    assert_eq!(writer.id(), 2);
    assert!(writer.is_healthy());
    assert_eq!(pool.stats().destroyed, 1);
}

#[test]
fn test_closing_writer_pool_publishes_pending_records() {
    let config = TestConfig::new("pool_writer_close");
    let factory = BatchWriterFactory::new(config.writer_config(100, Duration::from_secs(3600)));
    let pool = WriterPool::new(factory, pool_config(2, WhenExhausted::Block));

    {
        let writer = pool.borrow().unwrap();
        writer.add_record(&test_record(0)).unwrap();
        writer.add_record(&test_record(1)).unwrap();
    }
    pool.close();

    let records = read_all_published(config.temp_dir_path());
    assert_eq!(records, vec![test_record(0), test_record(1)]);
    assert!(data_files(config.temp_dir_path()).is_empty());
}
