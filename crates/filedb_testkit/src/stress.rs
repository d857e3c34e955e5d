//! Stress helpers for FileDB.
//!
//! These run many connections against the orders table of a running
//! database, sequentially or from several threads at once.

use crate::fixtures::{Order, ORDERS};
use filedb_core::{CoreError, Database};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

impl fmt::Display for StressTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ops ({} ok, {} failed) in {:?}, {:.2} ops/sec",
            self.total_ops,
            self.successful_ops,
            self.failed_ops,
            self.duration,
            self.ops_per_second
        )
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of connections to run.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Orders inserted per connection.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            batch_size: 5,
        }
    }
}

fn batch(first_id: u64, size: usize) -> Vec<Order> {
    (first_id..first_id + size as u64)
        .map(|id| Order::new(id, "stress", id))
        .collect()
}

/// Commits `config.operations` connections, each inserting one batch.
pub fn stress_sequential_inserts(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let orders = batch((i * config.batch_size) as u64, config.batch_size);
        match db.transaction(|conn| conn.insert_many(ORDERS, &orders)) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs the connections of [`stress_sequential_inserts`] spread over
/// `config.threads` threads contending for the same table.
pub fn stress_concurrent_inserts(db: &Database, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    let first_id = ((t * ops_per_thread + i) * config.batch_size) as u64;
                    let orders = batch(first_id, config.batch_size);

                    match db.transaction(|conn| conn.insert_many(ORDERS, &orders)) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs connections of which every other one aborts.
pub fn stress_connection_aborts(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let orders = batch((i * config.batch_size) as u64, config.batch_size);

        // Every other connection will fail intentionally
        let should_fail = i % 2 == 0;

        let result = db.transaction(|conn| {
            conn.insert_many(ORDERS, &orders)?;
            if should_fail {
                Err(CoreError::invalid_operation("intentional"))
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
