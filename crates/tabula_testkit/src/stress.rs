//! Stress tests for Tabula.
//!
//! These helpers drive a card table under heavy load and concurrent access.
//! Each returns a [`StressTestResult`]; a failed operation or an observed
//! snapshot anomaly counts as a failure.

use crate::fixtures::scenarios;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tabula_codec::{field_map, Value};
use tabula_core::{Connection, CoreError, CoreResult, ReadOption, WriteOptions};

/// Table the stress helpers write to.
pub const STRESS_TABLE: &str = "stress";

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

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent reader threads.
    pub threads: usize,
    /// Number of distinct cards.
    pub card_count: usize,
    /// Rows written per card before concurrent runs start.
    pub rows_per_card: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            card_count: 100,
            rows_per_card: 4,
        }
    }
}

fn ensure_table(conn: &Connection) -> CoreResult<()> {
    match conn.create_table(scenarios::card_table(STRESS_TABLE)) {
        Ok(_) | Err(CoreError::TableExists { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

fn card(i: usize, config: &StressConfig) -> String {
    format!("card{}", i % config.card_count.max(1))
}

fn populate(conn: &Connection, config: &StressConfig) -> CoreResult<()> {
    ensure_table(conn)?;
    for i in 0..config.card_count * config.rows_per_card {
        let row = scenarios::card_row(&card(i, config), "mcc0", i as i64);
        conn.put(STRESS_TABLE, &row, &WriteOptions::relaxed())?;
    }
    Ok(())
}

/// Run a sequential put stress test.
pub fn stress_sequential_puts(conn: &Connection, config: &StressConfig) -> StressTestResult {
    if ensure_table(conn).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let row = scenarios::card_row(&card(i, config), "mcc0", i as i64);
        match conn.put(STRESS_TABLE, &row, &WriteOptions::relaxed()) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a point query stress test. A query returning the wrong number of
/// rows counts as a failure.
pub fn stress_point_queries(conn: &Connection, config: &StressConfig) -> StressTestResult {
    if populate(conn, config).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let option = ReadOption::new().bind("card", card(i, config));
        match conn
            .query(STRESS_TABLE, &option)
            .and_then(|mut cursor| cursor.count_matches())
        {
            Ok(n) if n == config.rows_per_card => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed put/update/query/delete stress test.
pub fn stress_mixed_operations(conn: &Connection, config: &StressConfig) -> StressTestResult {
    if ensure_table(conn).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }
    let options = WriteOptions::relaxed();

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let card = card(i, config);
        let condition = field_map([("card", card.as_str())]);
        let result = match i % 4 {
            0 => conn
                .put(STRESS_TABLE, &scenarios::card_row(&card, "mcc0", i as i64), &options)
                .map(|_| ()),
            1 => conn
                .update(STRESS_TABLE, &condition, &field_map([("mcc", "mcc1")]), &options)
                .map(|_| ()),
            2 => conn
                .query(STRESS_TABLE, &ReadOption::from_condition(&condition))
                .and_then(|cursor| cursor.collect_rows())
                .map(|_| ()),
            _ => conn.delete(STRESS_TABLE, &condition, &options).map(|_| ()),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs one writer updating whole cards against concurrent readers.
///
/// Every update rewrites all rows of a card in one batch, so a reader must
/// see either every row with the old `mcc` or every row with the new one,
/// and always `rows_per_card` rows. Reads that observe a mix, or a
/// different count, are failures.
pub fn stress_concurrent_readers(conn: &Connection, config: &StressConfig) -> StressTestResult {
    if populate(conn, config).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let reads_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();

    let writer = {
        let conn = conn.clone();
        let config = config.clone();
        let done = Arc::clone(&done);
        let failed = Arc::clone(&failed);
        thread::spawn(move || {
            let mut i = 0usize;
            while !done.load(Ordering::Acquire) {
                let condition = field_map([("card", card(i, &config))]);
                let values = field_map([("mcc", format!("mcc{i}"))]);
                if conn
                    .update(STRESS_TABLE, &condition, &values, &WriteOptions::relaxed())
                    .is_err()
                {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                i += 1;
            }
        })
    };

    let readers: Vec<_> = (0..config.threads)
        .map(|t| {
            let conn = conn.clone();
            let config = config.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..reads_per_thread {
                    let option = ReadOption::new().bind("card", card(t * reads_per_thread + i, &config));
                    let consistent = conn
                        .query(STRESS_TABLE, &option)
                        .and_then(|cursor| cursor.collect_rows())
                        .map(|rows| {
                            let first = rows.first().and_then(|r| r.get("mcc")).cloned();
                            rows.len() == config.rows_per_card
                                && rows
                                    .iter()
                                    .all(|r| r.get("mcc").cloned() == first)
                                && first.as_ref().is_some_and(|v| matches!(v, Value::Varchar(_)))
                        });
                    if let Ok(true) = consistent {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in readers {
        handle.join().expect("Thread panicked");
    }
    done.store(true, Ordering::Release);
    writer.join().expect("Thread panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
