//! Flow Control Tests
//!
//! These tests verify:
//! - A full memtable rotates exactly once and schedules one background call
//! - Writers wait while an immutable memtable is still being flushed
//! - Writers block at the level-0 stop trigger until compaction catches up
//! - A single delay at the level-0 slowdown trigger

#[path = "../common/mod.rs"]
mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use emberkv::version::{VersionSet, VersionView};
use emberkv::{Config, Engine};
use tempfile::TempDir;

use common::ManualEnv;

const BUFFER: usize = 4 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn manual_engine(temp_dir: &TempDir) -> (Arc<ManualEnv>, Engine) {
    let env = ManualEnv::new();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .write_buffer_size(BUFFER)
        .build();
    let engine = Engine::builder(config).env(env.clone()).open().unwrap();
    (env, engine)
}

fn fill_memtable(engine: &Engine, tag: &str) {
    engine
        .put(format!("fill-{}", tag).as_bytes(), &vec![b'f'; BUFFER + 1])
        .unwrap();
    assert!(engine.active_memtable().approximate_memory_usage() > BUFFER);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_full_memtable_rotates_once() {
    let temp_dir = TempDir::new().unwrap();
    let (env, engine) = manual_engine(&temp_dir);
    let engine = Arc::new(engine);
    fill_memtable(&engine, "a");
    assert_eq!(env.scheduled(), 0);
    assert_eq!(engine.log_number(), 1);

    // Few enough small writes to fit in the fresh memtable
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..5 {
                    engine.put(format!("small-{}-{}", t, i).as_bytes(), b"v").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(env.scheduled(), 1);
    assert_eq!(engine.log_number(), 2);
    assert_eq!(env.files_created(), 2);
    assert!(engine.has_immutable_memtable());
    assert_eq!(engine.active_memtable().entry_count(), 20);

    env.drain();
    assert!(!engine.has_immutable_memtable());
    assert_eq!(engine.get(b"fill-a").unwrap(), Some(vec![b'f'; BUFFER + 1]));
}

#[test]
fn test_writer_waits_for_pending_flush() {
    let temp_dir = TempDir::new().unwrap();
    let (env, engine) = manual_engine(&temp_dir);
    let engine = Arc::new(engine);

    fill_memtable(&engine, "a");
    fill_memtable(&engine, "b"); // rotates: "a" becomes immutable
    assert!(engine.has_immutable_memtable());
    assert_eq!(env.pending(), 1);

    let (tx, rx) = mpsc::channel();
    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            engine.put(b"blocked", b"v").unwrap();
            tx.send(()).unwrap();
        })
    };

    // Active memtable is full and the immutable one is not flushed yet
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(env.run_pending(), 1);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();

    // The unblocked writer rotated again
    assert_eq!(engine.log_number(), 3);
    assert_eq!(env.pending(), 1);
    env.drain();
    assert_eq!(engine.get(b"blocked").unwrap(), Some(b"v".to_vec()));
    assert_eq!(engine.get(b"fill-a").unwrap(), Some(vec![b'f'; BUFFER + 1]));
    assert_eq!(engine.get(b"fill-b").unwrap(), Some(vec![b'f'; BUFFER + 1]));
}

#[test]
fn test_forced_rotation_of_room_left_memtable() {
    let temp_dir = TempDir::new().unwrap();
    let (env, engine) = manual_engine(&temp_dir);
    let engine = Arc::new(engine);
    engine.put(b"k", b"v").unwrap();

    let compacting = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.compact_memtable())
    };

    // Wait for the rotation to schedule its flush, then run it
    let deadline = Instant::now() + Duration::from_secs(5);
    while env.pending() == 0 {
        assert!(Instant::now() < deadline, "flush never scheduled");
        thread::sleep(Duration::from_millis(1));
    }
    env.drain();

    compacting.join().unwrap().unwrap();
    assert_eq!(engine.log_number(), 2);
    assert!(engine.active_memtable().is_empty());
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

// =============================================================================
// Level-0 Pressure Tests
// =============================================================================

#[test]
fn test_stop_trigger_blocks_until_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .write_buffer_size(BUFFER)
        .build();
    let versions = Arc::new(VersionSet::new(config.l0_compaction_trigger));
    versions.set_level0_file_count(config.l0_stop_writes_trigger);
    let engine = Arc::new(
        Engine::builder(config)
            .versions(Arc::clone(&versions))
            .open()
            .unwrap(),
    );

    // Room left: slowed down once, but admitted
    fill_memtable(&engine, "a");

    let (tx, rx) = mpsc::channel();
    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            engine.put(b"blocked", b"v").unwrap();
            tx.send(()).unwrap();
        })
    };
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(engine.log_number(), 1);

    engine.compact_levels().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();

    assert!(versions.level0_file_count() < 12);
    assert_eq!(engine.log_number(), 2);
    assert_eq!(engine.get(b"blocked").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_slowdown_trigger_delays_write_once() {
    let temp_dir = TempDir::new().unwrap();
    let delay = Duration::from_millis(50);
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .slowdown_delay(delay)
        .build();
    let versions = Arc::new(VersionSet::new(config.l0_compaction_trigger));
    let engine = Engine::builder(config.clone())
        .versions(Arc::clone(&versions))
        .open()
        .unwrap();

    let start = Instant::now();
    engine.put(b"fast", b"v").unwrap();
    let unthrottled = start.elapsed();

    versions.set_level0_file_count(config.l0_slowdown_writes_trigger);
    let start = Instant::now();
    engine.put(b"slow", b"v").unwrap();
    let throttled = start.elapsed();

    assert!(throttled >= delay, "throttled write took {:?}", throttled);
    assert!(throttled < delay * 20, "throttled write took {:?}", throttled);
    assert!(unthrottled < delay, "unthrottled write took {:?}", unthrottled);
    versions.set_level0_file_count(0);
}

#[test]
fn test_background_error_stops_scheduling() {
    let temp_dir = TempDir::new().unwrap();
    let env = ManualEnv::new();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .write_buffer_size(BUFFER)
        .build();
    let engine = Engine::builder(config)
        .env(env.clone())
        .compactor(Arc::new(common::FailingCompactor))
        .open()
        .unwrap();

    fill_memtable(&engine, "a");
    fill_memtable(&engine, "b");
    assert_eq!(env.scheduled(), 1);

    env.drain();
    assert!(engine.background_error().is_some());
    assert!(engine.put(b"k", b"v").unwrap_err().is_background());
    assert_eq!(env.scheduled(), 1);
}
