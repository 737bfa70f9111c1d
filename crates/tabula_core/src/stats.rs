//! Database statistics.
//!
//! Two kinds of numbers live here: operation counters kept for the whole
//! database ([`DatabaseStats`]), and a structural summary computed on demand
//! for one table ([`TableStats`]).
//!
//! # Usage
//!
//! ```rust,ignore
//! let db = Database::open_in_memory()?;
//! let conn = db.connect();
//! conn.put("test1", &fields, &WriteOptions::default())?;
//!
//! let ops = db.stats();
//! println!("puts: {}", ops.puts);
//! let table = conn.stats("test1")?;
//! println!("live rows: {}", table.live_records);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Database-wide operation counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    puts: AtomicU64,
    updates: AtomicU64,
    rows_updated: AtomicU64,
    deletes: AtomicU64,
    rows_deleted: AtomicU64,
    queries: AtomicU64,
    traversals: AtomicU64,
    seals: AtomicU64,
    checkpoints: AtomicU64,
    bytes_written: AtomicU64,
    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, bytes: u64) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self, rows: u64) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.rows_updated.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, rows: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.rows_deleted.fetch_add(rows, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_traversal(&self) {
        self.traversals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_seal(&self) {
        self.seals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            puts: load(&self.puts),
            updates: load(&self.updates),
            rows_updated: load(&self.rows_updated),
            deletes: load(&self.deletes),
            rows_deleted: load(&self.rows_deleted),
            queries: load(&self.queries),
            traversals: load(&self.traversals),
            seals: load(&self.seals),
            checkpoints: load(&self.checkpoints),
            bytes_written: load(&self.bytes_written),
            errors: load(&self.errors),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Successful puts.
    pub puts: u64,
    /// Update calls.
    pub updates: u64,
    /// Rows rewritten by updates.
    pub rows_updated: u64,
    /// Delete calls.
    pub deletes: u64,
    /// Rows tombstoned by deletes.
    pub rows_deleted: u64,
    /// Queries executed, batch items included.
    pub queries: u64,
    /// Traversals started.
    pub traversals: u64,
    /// Segments sealed, automatic seals included.
    pub seals: u64,
    /// Checkpoints performed.
    pub checkpoints: u64,
    /// Row bytes appended by puts.
    pub bytes_written: u64,
    /// Failed operations.
    pub errors: u64,
}

/// Structural summary of one table at its current watermark.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: String,
    /// Record versions stored, tombstones included.
    pub total_records: u64,
    /// Rows a traversal would return.
    pub live_records: u64,
    /// Tombstone records.
    pub tombstones: u64,
    /// Sealed segments.
    pub sealed_segments: u64,
    /// Records in the active segment.
    pub active_records: u64,
    /// Entries across all indexes.
    pub index_entries: u64,
    /// Highest visible pkey.
    pub watermark: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let snap = DatabaseStats::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = DatabaseStats::new();
        stats.record_put(100);
        stats.record_put(50);
        stats.record_update(3);
        stats.record_delete(2);
        stats.record_query();
        stats.record_seal();

        let snap = stats.snapshot();
        assert_eq!(snap.puts, 2);
        assert_eq!(snap.bytes_written, 150);
        assert_eq!(snap.updates, 1);
        assert_eq!(snap.rows_updated, 3);
        assert_eq!(snap.rows_deleted, 2);
        assert_eq!(snap.queries, 1);
        assert_eq!(snap.seals, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_query();
                    s.record_put(1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.queries, 1000);
        assert_eq!(snap.puts, 1000);
    }
}
