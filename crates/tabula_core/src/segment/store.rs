//! Per-table segment set management.

use crate::error::{CoreError, CoreResult};
use crate::segment::file::Segment;
use crate::segment::record::SegmentRecord;
use crate::types::{Pkey, SegmentId, TableId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tabula_storage::BackendProvider;
use tracing::{info, warn};

/// Owns a table's segments: sealed ones in id order, then the single
/// active segment.
///
/// Pkey allocation and the visible watermark live here. Writers publish the
/// watermark with release ordering only after a record is appended and
/// indexed; readers load it with acquire ordering and ignore anything above.
pub struct SegmentManager {
    table: TableId,
    provider: Arc<dyn BackendProvider>,
    segments: RwLock<Vec<Arc<Segment>>>,
    next_pkey: AtomicU64,
    watermark: AtomicU64,
}

impl SegmentManager {
    /// Creates the first active segment of a new table.
    pub fn create(table: TableId, provider: Arc<dyn BackendProvider>) -> CoreResult<Self> {
        let first = SegmentId::new(1);
        let backend = provider.create(table.as_u32(), first.as_u64())?;
        let segment = Segment::create(first, backend)?;
        Ok(Self {
            table,
            provider,
            segments: RwLock::new(vec![Arc::new(segment)]),
            next_pkey: AtomicU64::new(1),
            watermark: AtomicU64::new(0),
        })
    }

    /// Opens every segment of an existing table.
    ///
    /// Only the newest segment may be unsealed. If it is sealed (or there
    /// are no segments) a fresh active segment is installed.
    pub fn open(table: TableId, provider: Arc<dyn BackendProvider>) -> CoreResult<Self> {
        let ids = provider.list(table.as_u32())?;
        let mut segments = Vec::with_capacity(ids.len() + 1);
        for (n, raw) in ids.iter().enumerate() {
            let id = SegmentId::new(*raw);
            let segment = Segment::open(id, provider.open(table.as_u32(), *raw)?)?;
            if !segment.is_sealed() && n + 1 != ids.len() {
                warn!(table = %table, segment = %id, "sealing stale active segment");
                segment.seal(true)?;
            }
            segments.push(Arc::new(segment));
        }

        let max_pkey = segments
            .iter()
            .filter_map(|s| s.last_pkey())
            .max()
            .unwrap_or(Pkey::NONE);
        for pair in segments.windows(2) {
            if let (Some(prev), Some(next)) = (pair[0].last_pkey(), pair[1].first_pkey()) {
                if prev >= next {
                    return Err(CoreError::segment_corruption(format!(
                        "table {table}: segment {} overlaps segment {}",
                        pair[0].id(),
                        pair[1].id()
                    )));
                }
            }
        }

        let needs_active = segments.last().map_or(true, |s| s.is_sealed());
        if needs_active {
            let id = segments
                .last()
                .map_or(SegmentId::new(1), |s| s.id().next());
            let backend = provider.create(table.as_u32(), id.as_u64())?;
            segments.push(Arc::new(Segment::create(id, backend)?));
        }

        Ok(Self {
            table,
            provider,
            segments: RwLock::new(segments),
            next_pkey: AtomicU64::new(max_pkey.as_u64() + 1),
            watermark: AtomicU64::new(max_pkey.as_u64()),
        })
    }

    /// The active segment.
    #[must_use]
    pub fn active(&self) -> Arc<Segment> {
        let segments = self.segments.read();
        // Never empty: create/open always install an active segment.
        Arc::clone(&segments[segments.len() - 1])
    }

    /// A consistent copy of the segment list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    /// Reserves the next pkey. Only the table writer calls this.
    pub fn allocate(&self) -> Pkey {
        Pkey::new(self.next_pkey.fetch_add(1, Ordering::Relaxed))
    }

    /// The pkey the next allocation will return.
    #[must_use]
    pub fn peek_next(&self) -> Pkey {
        Pkey::new(self.next_pkey.load(Ordering::Relaxed))
    }

    /// Makes every record up to `pkey` visible to new readers.
    pub fn publish(&self, pkey: Pkey) {
        self.watermark.fetch_max(pkey.as_u64(), Ordering::Release);
    }

    /// Highest pkey visible to readers.
    #[must_use]
    pub fn watermark(&self) -> Pkey {
        Pkey::new(self.watermark.load(Ordering::Acquire))
    }

    /// Appends to the active segment.
    pub fn append(&self, record: &SegmentRecord) -> CoreResult<u64> {
        self.active().append(record)
    }

    /// Segment holding `pkey`, if any.
    #[must_use]
    pub fn locate(&self, pkey: Pkey) -> Option<Arc<Segment>> {
        locate(&self.segments.read(), pkey).cloned()
    }

    /// Marks `pkey` as replaced by `by`.
    pub fn mark_superseded(&self, pkey: Pkey, by: Pkey) -> CoreResult<()> {
        match self.locate(pkey) {
            Some(segment) if segment.mark_superseded(pkey, by) => Ok(()),
            _ => Err(CoreError::segment_corruption(format!(
                "table {}: version chain refers to missing {pkey}",
                self.table
            ))),
        }
    }

    /// Remembers where the active segment ends before a write batch.
    ///
    /// The caller must hold the table writer.
    #[must_use]
    pub fn begin_batch(&self) -> BatchMark {
        let segment = self.active();
        BatchMark {
            len: segment.len(),
            data_end: segment.data_size(),
            next_pkey: self.peek_next(),
            segment,
        }
    }

    /// Drops every record appended since `mark` was taken.
    ///
    /// Nothing past the watermark has been published, so readers never saw
    /// the records. If the backend cannot be cut back the orphaned bytes
    /// stay on disk: their pkeys are not reused and the segment is sealed
    /// so that its tail is never scanned again.
    pub fn rollback(&self, mark: BatchMark) {
        match mark.segment.rollback_to(mark.len, mark.data_end) {
            Ok(()) => {
                self.next_pkey
                    .store(mark.next_pkey.as_u64(), Ordering::Relaxed);
            }
            Err(e) => {
                warn!(
                    table = %self.table,
                    segment = %mark.segment.id(),
                    error = %e,
                    "cannot cut back aborted batch; retiring segment"
                );
                if let Err(e) = self.seal_active(false) {
                    warn!(table = %self.table, error = %e, "cannot retire segment");
                }
            }
        }
    }

    /// Seals the active segment and installs a new empty one.
    ///
    /// The next segment is created first, so a failure at either step
    /// leaves the current active segment open and in place. The caller must
    /// hold the table writer so no append can slip in between.
    pub fn seal_active(&self, sync: bool) -> CoreResult<SegmentId> {
        let active = self.active();
        let next = active.id().next();
        let segment = Arc::new(self.create_segment(next)?);
        let sealed = match active.seal(sync) {
            Ok(sealed) => sealed,
            Err(e) => {
                drop(segment);
                self.discard(next);
                return Err(e);
            }
        };
        self.segments.write().push(segment);
        info!(
            table = %self.table,
            segment = %sealed,
            records = active.len(),
            "sealed segment"
        );
        Ok(sealed)
    }

    fn create_segment(&self, id: SegmentId) -> CoreResult<Segment> {
        let backend = self.provider.create(self.table.as_u32(), id.as_u64())?;
        Segment::create(id, backend).map_err(|e| {
            self.discard(id);
            e
        })
    }

    /// Removes a segment that never joined the segment list.
    fn discard(&self, id: SegmentId) {
        if let Err(e) = self.provider.remove(self.table.as_u32(), id.as_u64()) {
            warn!(table = %self.table, segment = %id, error = %e, "cannot remove unused segment");
        }
    }

    /// Syncs the active segment.
    pub fn sync_active(&self) -> CoreResult<()> {
        self.active().sync()
    }

    /// Number of sealed segments.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.segments.read().iter().filter(|s| s.is_sealed()).count()
    }
}

/// Position of the active segment before a write batch.
#[derive(Debug)]
pub struct BatchMark {
    segment: Arc<Segment>,
    len: usize,
    data_end: u64,
    next_pkey: Pkey,
}

/// Finds the segment of `segments` whose pkey range covers `pkey`.
///
/// Segments hold disjoint, ascending pkey ranges, so a search from the
/// newest end finds recent records first.
pub(crate) fn locate(segments: &[Arc<Segment>], pkey: Pkey) -> Option<&Arc<Segment>> {
    segments.iter().rev().find(|s| s.covers(pkey))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_storage::{DirectoryProvider, FaultyProvider, MemoryProvider};
    use tempfile::tempdir;

    fn put(manager: &SegmentManager, payload: &[u8]) -> Pkey {
        let pkey = manager.allocate();
        manager
            .append(&SegmentRecord::put(pkey, pkey, payload.to_vec()))
            .unwrap();
        manager.publish(pkey);
        pkey
    }

    #[test]
    fn pkeys_are_monotonic_across_seals() {
        let manager = SegmentManager::create(TableId::new(1), Arc::new(MemoryProvider::new())).unwrap();
        let a = put(&manager, b"a");
        let sealed = manager.seal_active(false).unwrap();
        let b = put(&manager, b"b");

        assert_eq!(sealed, SegmentId::new(1));
        assert!(a < b);
        assert_eq!(manager.active().id(), SegmentId::new(2));
        assert_eq!(manager.locate(a).unwrap().id(), SegmentId::new(1));
        assert_eq!(manager.locate(b).unwrap().id(), SegmentId::new(2));
        assert_eq!(manager.watermark(), b);
    }

    #[test]
    fn sealing_empty_active_yields_valid_id() {
        let manager = SegmentManager::create(TableId::new(1), Arc::new(MemoryProvider::new())).unwrap();
        let first = manager.seal_active(false).unwrap();
        let second = manager.seal_active(false).unwrap();
        assert_eq!(first, SegmentId::new(1));
        assert_eq!(second, SegmentId::new(2));
        assert_eq!(manager.sealed_count(), 2);

        let pkey = put(&manager, b"after");
        assert_eq!(manager.locate(pkey).unwrap().id(), SegmentId::new(3));
    }

    #[test]
    fn reopen_restores_counters_and_active_segment() {
        let dir = tempdir().unwrap();
        let provider: Arc<dyn BackendProvider> = Arc::new(DirectoryProvider::new(dir.path()));
        {
            let manager = SegmentManager::create(TableId::new(3), provider.clone()).unwrap();
            put(&manager, b"1");
            manager.seal_active(true).unwrap();
            put(&manager, b"2");
            manager.sync_active().unwrap();
        }

        let manager = SegmentManager::open(TableId::new(3), provider.clone()).unwrap();
        assert_eq!(manager.watermark(), Pkey::new(2));
        assert_eq!(manager.peek_next(), Pkey::new(3));
        assert_eq!(manager.active().id(), SegmentId::new(2));
        assert_eq!(manager.sealed_count(), 1);
    }

    #[test]
    fn reopen_after_seal_installs_new_active() {
        let provider: Arc<dyn BackendProvider> = Arc::new(MemoryProvider::new());
        {
            let manager = SegmentManager::create(TableId::new(1), provider.clone()).unwrap();
            put(&manager, b"x");
            manager.active().seal(false).unwrap();
        }
        let manager = SegmentManager::open(TableId::new(1), provider).unwrap();
        assert_eq!(manager.active().id(), SegmentId::new(2));
        assert!(!manager.active().is_sealed());
    }

    fn faulty_manager() -> (Arc<FaultyProvider>, SegmentManager) {
        let provider = Arc::new(FaultyProvider::new(Arc::new(MemoryProvider::new())));
        let manager = SegmentManager::create(TableId::new(1), provider.clone()).unwrap();
        (provider, manager)
    }

    #[test]
    fn failed_create_keeps_active_segment() {
        let (provider, manager) = faulty_manager();
        put(&manager, b"before");

        provider.fail_creates(true);
        assert!(manager.seal_active(false).is_err());
        provider.heal();

        assert_eq!(manager.sealed_count(), 0);
        assert!(!manager.active().is_sealed());
        let pkey = put(&manager, b"after");
        assert_eq!(manager.locate(pkey).unwrap().id(), SegmentId::new(1));
        assert_eq!(manager.seal_active(false).unwrap(), SegmentId::new(1));
        assert_eq!(manager.active().id(), SegmentId::new(2));
    }

    #[test]
    fn failed_trailer_removes_next_segment() {
        let (provider, manager) = faulty_manager();
        put(&manager, b"before");

        // The new segment's header goes through, the trailer does not.
        provider.fail_appends_after(1);
        assert!(manager.seal_active(false).is_err());
        provider.heal();

        assert_eq!(provider.list(1).unwrap(), vec![1]);
        assert_eq!(manager.snapshot().len(), 1);
        put(&manager, b"after");
        assert_eq!(manager.seal_active(false).unwrap(), SegmentId::new(1));
        assert_eq!(provider.list(1).unwrap(), vec![1, 2]);
    }

    #[test]
    fn rollback_returns_pkeys_and_bytes() {
        let manager = SegmentManager::create(TableId::new(1), Arc::new(MemoryProvider::new())).unwrap();
        let kept = put(&manager, b"kept");
        let mark = manager.begin_batch();
        let size = manager.active().data_size();
        for _ in 0..3 {
            let pkey = manager.allocate();
            manager
                .append(&SegmentRecord::put(pkey, pkey, b"lost".to_vec()))
                .unwrap();
        }

        manager.rollback(mark);
        assert_eq!(manager.peek_next(), Pkey::new(kept.as_u64() + 1));
        assert_eq!(manager.active().data_size(), size);
        assert_eq!(manager.active().len(), 1);
        assert_eq!(manager.watermark(), kept);
    }

    #[test]
    fn rollback_without_truncate_retires_segment() {
        let (provider, manager) = faulty_manager();
        put(&manager, b"kept");
        let mark = manager.begin_batch();
        let orphan = manager.allocate();
        manager
            .append(&SegmentRecord::put(orphan, orphan, b"orphan".to_vec()))
            .unwrap();

        provider.fail_truncates(true);
        manager.rollback(mark);
        provider.heal();

        assert!(manager.locate(orphan).is_none());
        assert!(manager.peek_next() > orphan);
        assert_eq!(manager.sealed_count(), 1);

        let reopened = SegmentManager::open(TableId::new(1), provider).unwrap();
        assert!(reopened.locate(orphan).is_none());
        assert_eq!(reopened.watermark(), Pkey::new(1));
    }

    #[test]
    fn mark_superseded_rejects_unknown_pkey() {
        let manager = SegmentManager::create(TableId::new(1), Arc::new(MemoryProvider::new())).unwrap();
        assert!(manager.mark_superseded(Pkey::new(7), Pkey::new(8)).is_err());
    }
}
