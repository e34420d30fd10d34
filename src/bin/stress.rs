//! EmberKV Write Stress Binary
//!
//! Hammers the write path from many threads and reports throughput, group
//! commit behavior and memtable rotations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use emberkv::{Config, Engine, WriteBatch, WriteOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// EmberKV write-path stress driver
#[derive(Parser, Debug)]
#[command(name = "emberkv-stress")]
#[command(about = "Concurrent write stress for the EmberKV write path")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./emberkv_stress")]
    data_dir: String,

    /// Number of writer threads
    #[arg(short, long, default_value = "8")]
    threads: usize,

    /// Batches written by each thread
    #[arg(short = 'n', long, default_value = "10000")]
    batches: usize,

    /// Operations per batch
    #[arg(short, long, default_value = "1")]
    ops_per_batch: usize,

    /// Value size in bytes
    #[arg(short, long, default_value = "100")]
    value_size: usize,

    /// Sync the log on every write
    #[arg(long)]
    sync: bool,

    /// MemTable budget in KB before rotation
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kb: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,emberkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("EmberKV stress v{}", emberkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!(
        "{} threads x {} batches x {} ops, {} byte values, sync={}",
        args.threads,
        args.batches,
        args.ops_per_batch,
        args.value_size,
        args.sync
    );

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .write_buffer_size(args.memtable_kb * 1024)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let failures = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..args.threads)
        .map(|thread_id| {
            let engine = Arc::clone(&engine);
            let failures = Arc::clone(&failures);
            let options = WriteOptions { sync: args.sync };
            let value = vec![b'x'; args.value_size];
            let batches = args.batches;
            let ops_per_batch = args.ops_per_batch;

            thread::spawn(move || {
                for i in 0..batches {
                    let mut batch = WriteBatch::new();
                    for op in 0..ops_per_batch {
                        let key = format!("t{:03}-{:08}-{:04}", thread_id, i, op);
                        batch.put(key.into_bytes(), value.clone());
                    }
                    if let Err(e) = engine.write(&options, batch) {
                        failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(thread_id, error = %e, "write failed");
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("writer thread panicked");
            failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    let elapsed = start.elapsed();
    let total_ops = (args.threads * args.batches * args.ops_per_batch) as u64;
    let failed = failures.load(Ordering::Relaxed);

    tracing::info!(
        "Wrote {} ops in {:.2?} ({:.0} ops/sec)",
        total_ops,
        elapsed,
        total_ops as f64 / elapsed.as_secs_f64()
    );
    tracing::info!(
        "last_sequence={} log_number={} failed_batches={}",
        engine.last_sequence(),
        engine.log_number(),
        failed
    );

    let engine = match Arc::try_unwrap(engine) {
        Ok(engine) => engine,
        Err(_) => {
            tracing::error!("engine still shared at shutdown");
            std::process::exit(1);
        }
    };
    if let Err(e) = engine.close() {
        tracing::error!("Error during close: {}", e);
        std::process::exit(1);
    }

    if failed > 0 {
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}
