//! A single segment file.
//!
//! ```text
//! | magic "TSEG" | version u16 | segment id u64 |       header
//! | record | record | ...                        |       see `record.rs`
//! | trailer entry * count                        |       sealed only
//! | count u32 | trailer offset u64 | crc32 u32 | "TSFT" | footer, sealed only
//! ```
//!
//! A trailer entry is `| pkey u64 | offset u64 | lineage u64 | len u32 | flags u8 |`,
//! sorted by pkey. Reopening a sealed segment reads only the footer and the
//! trailer; reopening an active one scans its records.

use crate::error::{CoreError, CoreResult};
use crate::segment::record::{read_array, SegmentRecord, SegmentRecordFlags};
use crate::types::{Pkey, SegmentId};
use parking_lot::RwLock;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tabula_storage::StorageBackend;
use tracing::{debug, warn};

const SEGMENT_MAGIC: [u8; 4] = *b"TSEG";
const FOOTER_MAGIC: [u8; 4] = *b"TSFT";
const SEGMENT_VERSION: u16 = 1;

/// magic (4) + version (2) + segment id (8)
pub(crate) const SEGMENT_HEADER_SIZE: u64 = 14;
/// count (4) + trailer offset (8) + crc (4) + magic (4)
const FOOTER_SIZE: u64 = 20;
/// pkey (8) + offset (8) + lineage (8) + len (4) + flags (1)
const TRAILER_ENTRY_SIZE: usize = 29;

const OPEN: u8 = 0;
const APPENDING: u8 = 1;
const SEALING: u8 = 2;
const SEALED: u8 = 3;

/// In-memory locator for one record of the segment.
#[derive(Debug)]
struct Slot {
    pkey: Pkey,
    offset: u64,
    len: u32,
    lineage: Pkey,
    tombstone: bool,
    superseded_by: AtomicU64,
}

impl Slot {
    fn new(pkey: Pkey, offset: u64, len: u32, lineage: Pkey, tombstone: bool) -> Self {
        Self {
            pkey,
            offset,
            len,
            lineage,
            tombstone,
            superseded_by: AtomicU64::new(0),
        }
    }
}

/// Version-chain state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    /// Lineage the record belongs to.
    pub lineage: Pkey,
    /// Whether the record is a tombstone.
    pub tombstone: bool,
    /// Pkey of the version that replaced this one, [`Pkey::NONE`] if current.
    pub superseded_by: Pkey,
}

impl SlotState {
    /// Whether a reader at `watermark` sees this record as a live row.
    ///
    /// With `history` set, superseded versions are visible too; tombstones
    /// never are.
    #[must_use]
    pub fn is_visible(&self, watermark: Pkey, history: bool) -> bool {
        if self.tombstone {
            return false;
        }
        history || self.superseded_by.is_none() || self.superseded_by > watermark
    }

    /// Whether no later version exists at all.
    #[must_use]
    pub fn is_current(&self) -> bool {
        !self.tombstone && self.superseded_by.is_none()
    }
}

/// An append-only batch of records with a contiguous pkey range.
///
/// A segment accepts appends until it is sealed, after which it is
/// immutable apart from the in-memory `superseded_by` markers.
pub struct Segment {
    id: SegmentId,
    backend: Arc<dyn StorageBackend>,
    slots: RwLock<Vec<Slot>>,
    state: AtomicU8,
    data_end: AtomicU64,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("records", &self.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

impl Segment {
    /// Writes a fresh header to an empty backend.
    pub fn create(id: SegmentId, backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        if backend.size()? != 0 {
            return Err(CoreError::invalid_operation(format!(
                "backend for new segment {id} is not empty"
            )));
        }
        let mut header = Vec::with_capacity(SEGMENT_HEADER_SIZE as usize);
        header.extend_from_slice(&SEGMENT_MAGIC);
        header.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        header.extend_from_slice(&id.as_u64().to_le_bytes());
        backend.append(&header)?;
        backend.flush()?;

        Ok(Self {
            id,
            backend,
            slots: RwLock::new(Vec::new()),
            state: AtomicU8::new(OPEN),
            data_end: AtomicU64::new(SEGMENT_HEADER_SIZE),
        })
    }

    /// Opens an existing segment.
    ///
    /// A torn record at the tail of an unsealed segment is truncated away.
    pub fn open(id: SegmentId, backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        let size = backend.size()?;
        if size < SEGMENT_HEADER_SIZE {
            return Err(CoreError::segment_corruption(format!(
                "segment {id} shorter than its header"
            )));
        }
        let header = backend.read_at(0, SEGMENT_HEADER_SIZE as usize)?;
        if header[..4] != SEGMENT_MAGIC {
            return Err(CoreError::invalid_format(format!("segment {id}: bad magic")));
        }
        let version = u16::from_le_bytes(read_array(&header, 4));
        if version != SEGMENT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "segment {id}: unsupported version {version}"
            )));
        }
        let stored_id = u64::from_le_bytes(read_array(&header, 6));
        if stored_id != id.as_u64() {
            return Err(CoreError::segment_corruption(format!(
                "segment file for {id} carries id {stored_id}"
            )));
        }

        if let Some((slots, data_end)) = Self::read_trailer(id, &*backend, size)? {
            debug!(segment = %id, records = slots.len(), "opened sealed segment");
            return Ok(Self {
                id,
                backend,
                slots: RwLock::new(slots),
                state: AtomicU8::new(SEALED),
                data_end: AtomicU64::new(data_end),
            });
        }

        let (slots, data_end) = Self::recover_records(id, &*backend, size)?;
        debug!(segment = %id, records = slots.len(), "opened active segment");
        Ok(Self {
            id,
            backend,
            slots: RwLock::new(slots),
            state: AtomicU8::new(OPEN),
            data_end: AtomicU64::new(data_end),
        })
    }

    fn read_trailer(
        id: SegmentId,
        backend: &dyn StorageBackend,
        size: u64,
    ) -> CoreResult<Option<(Vec<Slot>, u64)>> {
        if size < SEGMENT_HEADER_SIZE + FOOTER_SIZE {
            return Ok(None);
        }
        let footer = backend.read_at(size - FOOTER_SIZE, FOOTER_SIZE as usize)?;
        if footer[16..20] != FOOTER_MAGIC {
            return Ok(None);
        }
        let count = u32::from_le_bytes(read_array(&footer, 0)) as usize;
        let trailer_offset = u64::from_le_bytes(read_array(&footer, 4));
        let stored_crc = u32::from_le_bytes(read_array(&footer, 12));

        let trailer_len = (count * TRAILER_ENTRY_SIZE) as u64;
        if trailer_offset < SEGMENT_HEADER_SIZE || trailer_offset + trailer_len + FOOTER_SIZE != size {
            return Err(CoreError::segment_corruption(format!(
                "segment {id}: footer points outside the file"
            )));
        }
        let trailer = backend.read_at(trailer_offset, trailer_len as usize)?;
        let computed_crc = crc32fast::hash(&trailer);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let slots = trailer
            .chunks_exact(TRAILER_ENTRY_SIZE)
            .map(|entry| {
                let flags = SegmentRecordFlags::from_byte(entry[28]);
                Slot::new(
                    Pkey::new(u64::from_le_bytes(read_array(entry, 0))),
                    u64::from_le_bytes(read_array(entry, 8)),
                    u32::from_le_bytes(read_array(entry, 24)),
                    Pkey::new(u64::from_le_bytes(read_array(entry, 16))),
                    flags.is_tombstone(),
                )
            })
            .collect();
        Ok(Some((slots, trailer_offset)))
    }

    fn recover_records(
        id: SegmentId,
        backend: &dyn StorageBackend,
        size: u64,
    ) -> CoreResult<(Vec<Slot>, u64)> {
        let data = backend.read_from(SEGMENT_HEADER_SIZE)?;
        let mut slots: Vec<Slot> = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let rest = &data[pos..];
            let len = match SegmentRecord::peek_len(rest) {
                Some(len) if len >= SegmentRecord::MIN_SIZE && len <= rest.len() => len,
                _ => break,
            };
            match SegmentRecord::decode(rest) {
                Ok(record) => {
                    if slots.last().is_some_and(|s| s.pkey >= record.pkey) {
                        return Err(CoreError::segment_corruption(format!(
                            "segment {id}: pkeys out of order at {}",
                            record.pkey
                        )));
                    }
                    slots.push(Slot::new(
                        record.pkey,
                        SEGMENT_HEADER_SIZE + pos as u64,
                        len as u32,
                        record.lineage,
                        record.is_tombstone(),
                    ));
                    pos += len;
                }
                Err(CoreError::ChecksumMismatch { expected, actual }) => {
                    if SegmentRecord::decode(&rest[len..]).is_ok() {
                        return Err(CoreError::segment_corruption(format!(
                            "segment {id}: checksum mismatch ({expected:08x} != {actual:08x}) \
                             before valid data at offset {}",
                            SEGMENT_HEADER_SIZE + pos as u64
                        )));
                    }
                    break;
                }
                Err(_) => break,
            }
        }

        let data_end = SEGMENT_HEADER_SIZE + pos as u64;
        if data_end < size {
            warn!(
                segment = %id,
                offset = data_end,
                discarded = size - data_end,
                "truncating torn segment tail"
            );
            backend.truncate(data_end)?;
        }
        Ok((slots, data_end))
    }

    /// Segment identifier.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// True when the segment holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Whether the segment is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.load(Ordering::Acquire) == SEALED
    }

    /// Bytes of header plus records, excluding any trailer.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_end.load(Ordering::Acquire)
    }

    /// Lowest pkey stored here.
    #[must_use]
    pub fn first_pkey(&self) -> Option<Pkey> {
        self.slots.read().first().map(|s| s.pkey)
    }

    /// Highest pkey stored here.
    #[must_use]
    pub fn last_pkey(&self) -> Option<Pkey> {
        self.slots.read().last().map(|s| s.pkey)
    }

    /// Whether `pkey` falls inside this segment's pkey range.
    #[must_use]
    pub fn covers(&self, pkey: Pkey) -> bool {
        let slots = self.slots.read();
        match (slots.first(), slots.last()) {
            (Some(first), Some(last)) => first.pkey <= pkey && pkey <= last.pkey,
            _ => false,
        }
    }

    /// Number of tombstone records.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.tombstone).count()
    }

    /// Appends a record. Pkeys must be strictly increasing.
    ///
    /// Returns the byte offset of the record.
    pub fn append(&self, record: &SegmentRecord) -> CoreResult<u64> {
        match self
            .state
            .compare_exchange(OPEN, APPENDING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(APPENDING) => return Err(CoreError::ConcurrentAppend { segment: self.id.as_u64() }),
            Err(_) => {
                return Err(CoreError::invalid_operation(format!(
                    "segment {} is sealed",
                    self.id
                )))
            }
        }
        let result = self.append_locked(record);
        self.state.store(OPEN, Ordering::Release);
        result
    }

    fn append_locked(&self, record: &SegmentRecord) -> CoreResult<u64> {
        if self.last_pkey().is_some_and(|last| last >= record.pkey) {
            return Err(CoreError::invalid_operation(format!(
                "pkey {} is not above the tail of segment {}",
                record.pkey, self.id
            )));
        }
        let bytes = record.encode()?;
        let offset = match self.backend.append(&bytes) {
            Ok(offset) => offset,
            Err(e) => {
                self.cut_back(self.data_size());
                return Err(e.into());
            }
        };
        self.slots.write().push(Slot::new(
            record.pkey,
            offset,
            bytes.len() as u32,
            record.lineage,
            record.is_tombstone(),
        ));
        self.data_end
            .store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Seals the segment by writing its trailer and footer.
    ///
    /// Sealing a sealed segment returns its id again. Fails with
    /// [`CoreError::ConcurrentAppend`] while an append (or another seal) is
    /// in flight.
    pub fn seal(&self, sync: bool) -> CoreResult<SegmentId> {
        match self
            .state
            .compare_exchange(OPEN, SEALING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(SEALED) => return Ok(self.id),
            Err(_) => return Err(CoreError::ConcurrentAppend { segment: self.id.as_u64() }),
        }
        let result = self.write_trailer(sync);
        let next = if result.is_ok() {
            SEALED
        } else {
            self.cut_back(self.data_size());
            OPEN
        };
        self.state.store(next, Ordering::Release);
        result.map(|()| self.id)
    }

    /// Abandons every record past the first `len`, cutting the backend back
    /// to `data_end`.
    ///
    /// Only records that were never published may be dropped. The slots go
    /// even when the backend refuses the truncate; the error is returned so
    /// the caller can retire the segment before its tail is scanned again.
    pub fn rollback_to(&self, len: usize, data_end: u64) -> CoreResult<()> {
        match self
            .state
            .compare_exchange(OPEN, APPENDING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(SEALED) => {
                return Err(CoreError::invalid_operation(format!(
                    "segment {} is sealed",
                    self.id
                )))
            }
            Err(_) => return Err(CoreError::ConcurrentAppend { segment: self.id.as_u64() }),
        }
        let dropped = {
            let mut slots = self.slots.write();
            let dropped = slots.len().saturating_sub(len);
            slots.truncate(len);
            dropped
        };
        let result = self.backend.truncate(data_end);
        if result.is_ok() {
            self.data_end.store(data_end, Ordering::Release);
        }
        self.state.store(OPEN, Ordering::Release);
        debug!(segment = %self.id, dropped, offset = data_end, "rolled back segment tail");
        result.map_err(Into::into)
    }

    /// Best-effort removal of bytes a failed write left past `data_end`.
    fn cut_back(&self, data_end: u64) {
        let size = match self.backend.size() {
            Ok(size) => size,
            Err(e) => {
                warn!(segment = %self.id, error = %e, "cannot size segment after failed write");
                return;
            }
        };
        if size > data_end {
            if let Err(e) = self.backend.truncate(data_end) {
                warn!(
                    segment = %self.id,
                    offset = data_end,
                    error = %e,
                    "cannot cut partial write off segment tail"
                );
            }
        }
    }

    fn write_trailer(&self, sync: bool) -> CoreResult<()> {
        // Bytes a failed write could not cut off sit between the records and
        // the trailer; the footer must point at where the trailer really lands.
        let trailer_offset = self.backend.size()?;
        let slots = self.slots.read();
        let count = u32::try_from(slots.len())
            .map_err(|_| CoreError::invalid_operation("segment holds too many records"))?;

        let mut trailer = Vec::with_capacity(slots.len() * TRAILER_ENTRY_SIZE);
        for slot in slots.iter() {
            trailer.extend_from_slice(&slot.pkey.as_u64().to_le_bytes());
            trailer.extend_from_slice(&slot.offset.to_le_bytes());
            trailer.extend_from_slice(&slot.lineage.as_u64().to_le_bytes());
            trailer.extend_from_slice(&slot.len.to_le_bytes());
            let flags = if slot.tombstone {
                SegmentRecordFlags::TOMBSTONE
            } else {
                SegmentRecordFlags::NONE
            };
            trailer.push(flags.as_byte());
        }
        let crc = crc32fast::hash(&trailer);

        let mut tail = trailer;
        tail.extend_from_slice(&count.to_le_bytes());
        tail.extend_from_slice(&trailer_offset.to_le_bytes());
        tail.extend_from_slice(&crc.to_le_bytes());
        tail.extend_from_slice(&FOOTER_MAGIC);

        self.backend.append(&tail)?;
        self.backend.flush()?;
        if sync {
            self.backend.sync()?;
        }
        Ok(())
    }

    fn position(slots: &[Slot], pkey: Pkey) -> Option<usize> {
        slots.binary_search_by_key(&pkey, |s| s.pkey).ok()
    }

    /// Version-chain state of `pkey`, if stored here.
    #[must_use]
    pub fn slot_state(&self, pkey: Pkey) -> Option<SlotState> {
        let slots = self.slots.read();
        let slot = &slots[Self::position(&slots, pkey)?];
        Some(SlotState {
            lineage: slot.lineage,
            tombstone: slot.tombstone,
            superseded_by: Pkey::new(slot.superseded_by.load(Ordering::Acquire)),
        })
    }

    /// Records that `pkey` was replaced by `by`. Returns false if `pkey` is
    /// not stored here.
    pub fn mark_superseded(&self, pkey: Pkey, by: Pkey) -> bool {
        let slots = self.slots.read();
        match Self::position(&slots, pkey) {
            Some(idx) => {
                slots[idx].superseded_by.store(by.as_u64(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Reads the record stored under `pkey`.
    pub fn get(&self, pkey: Pkey) -> CoreResult<Option<SegmentRecord>> {
        let located = {
            let slots = self.slots.read();
            Self::position(&slots, pkey).map(|idx| (slots[idx].offset, slots[idx].len))
        };
        let Some((offset, len)) = located else {
            return Ok(None);
        };
        let data = self.backend.read_at(offset, len as usize)?;
        let record = SegmentRecord::decode(&data)?;
        if record.pkey != pkey {
            return Err(CoreError::segment_corruption(format!(
                "segment {}: slot for {pkey} holds {}",
                self.id, record.pkey
            )));
        }
        Ok(Some(record))
    }

    /// Pkeys stored here that fall in `range`, ascending.
    #[must_use]
    pub fn pkeys<R: RangeBounds<Pkey>>(&self, range: R) -> Vec<Pkey> {
        let slots = self.slots.read();
        let start = match range.start_bound() {
            Bound::Included(p) => slots.partition_point(|s| s.pkey < *p),
            Bound::Excluded(p) => slots.partition_point(|s| s.pkey <= *p),
            Bound::Unbounded => 0,
        };
        slots[start..]
            .iter()
            .map(|s| s.pkey)
            .take_while(|p| range.contains(p))
            .collect()
    }

    /// Lazily reads the records whose pkeys fall in `range`.
    #[must_use]
    pub fn scan<R: RangeBounds<Pkey>>(self: &Arc<Self>, range: R) -> SegmentScan {
        SegmentScan {
            segment: Arc::clone(self),
            pkeys: self.pkeys(range).into_iter(),
        }
    }

    /// Flushes buffered writes.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Flushes and syncs the backend.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }
}

/// Forward-only iterator over a segment's records, reading each on demand.
#[derive(Debug)]
pub struct SegmentScan {
    segment: Arc<Segment>,
    pkeys: std::vec::IntoIter<Pkey>,
}

impl Iterator for SegmentScan {
    type Item = CoreResult<SegmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let pkey = self.pkeys.next()?;
        match self.segment.get(pkey) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => Some(Err(CoreError::segment_corruption(format!(
                "segment {}: {pkey} vanished during scan",
                self.segment.id
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_storage::{BackendProvider, FaultyProvider, InMemoryBackend, MemoryProvider};

    fn record(pkey: u64, payload: &[u8]) -> SegmentRecord {
        SegmentRecord::put(Pkey::new(pkey), Pkey::new(pkey), payload.to_vec())
    }

    fn fresh() -> (Arc<InMemoryBackend>, Arc<Segment>) {
        let backend = Arc::new(InMemoryBackend::new());
        let segment = Segment::create(SegmentId::new(1), backend.clone()).unwrap();
        (backend, Arc::new(segment))
    }

    #[test]
    fn append_then_get() {
        let (_, segment) = fresh();
        segment.append(&record(1, b"one")).unwrap();
        segment.append(&record(2, b"two")).unwrap();

        assert_eq!(segment.len(), 2);
        assert_eq!(segment.get(Pkey::new(2)).unwrap().unwrap().payload, b"two");
        assert!(segment.get(Pkey::new(3)).unwrap().is_none());
        assert!(segment.covers(Pkey::new(1)));
        assert!(!segment.covers(Pkey::new(9)));
    }

    #[test]
    fn pkeys_must_increase() {
        let (_, segment) = fresh();
        segment.append(&record(5, b"a")).unwrap();
        assert!(matches!(
            segment.append(&record(5, b"b")),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn seal_is_idempotent_and_blocks_appends() {
        let (_, segment) = fresh();
        segment.append(&record(1, b"x")).unwrap();
        assert_eq!(segment.seal(false).unwrap(), SegmentId::new(1));
        assert_eq!(segment.seal(false).unwrap(), SegmentId::new(1));
        assert!(segment.is_sealed());
        assert!(matches!(
            segment.append(&record(2, b"y")),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn seal_fails_while_append_in_flight() {
        let (_, segment) = fresh();
        segment.state.store(APPENDING, Ordering::Release);
        assert!(matches!(
            segment.seal(false),
            Err(CoreError::ConcurrentAppend { segment: 1 })
        ));
        segment.state.store(OPEN, Ordering::Release);
        assert!(segment.seal(false).is_ok());
    }

    #[test]
    fn sealed_segment_reopens_from_trailer() {
        let (backend, segment) = fresh();
        segment.append(&record(1, b"a")).unwrap();
        segment
            .append(&SegmentRecord::tombstone(Pkey::new(2), Pkey::new(1)))
            .unwrap();
        segment.append(&record(3, b"ccc")).unwrap();
        segment.seal(false).unwrap();

        let reopened = Segment::open(SegmentId::new(1), backend).unwrap();
        assert!(reopened.is_sealed());
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.tombstone_count(), 1);
        assert_eq!(reopened.get(Pkey::new(3)).unwrap().unwrap().payload, b"ccc");
        let state = reopened.slot_state(Pkey::new(2)).unwrap();
        assert!(state.tombstone);
        assert_eq!(state.lineage, Pkey::new(1));
    }

    fn faulty() -> (FaultyProvider, Arc<Segment>) {
        let provider = FaultyProvider::new(Arc::new(MemoryProvider::new()));
        let backend = provider.create(1, 1).unwrap();
        let segment = Segment::create(SegmentId::new(1), backend).unwrap();
        (provider, Arc::new(segment))
    }

    #[test]
    fn rollback_drops_unpublished_tail() {
        let (backend, segment) = fresh();
        segment.append(&record(1, b"kept")).unwrap();
        let (len, data_end) = (segment.len(), segment.data_size());
        segment.append(&record(2, b"dropped")).unwrap();
        segment.append(&record(3, b"dropped")).unwrap();

        segment.rollback_to(len, data_end).unwrap();
        assert_eq!(segment.len(), 1);
        assert_eq!(segment.data_size(), data_end);
        assert_eq!(backend.size().unwrap(), data_end);
        assert!(segment.get(Pkey::new(2)).unwrap().is_none());

        // The abandoned pkeys may be handed out again.
        segment.append(&record(2, b"again")).unwrap();
        let reopened = Segment::open(SegmentId::new(1), backend).unwrap();
        assert_eq!(reopened.pkeys(..), vec![Pkey::new(1), Pkey::new(2)]);
        assert_eq!(reopened.get(Pkey::new(2)).unwrap().unwrap().payload, b"again");
    }

    #[test]
    fn rollback_is_refused_once_sealed() {
        let (_, segment) = fresh();
        segment.append(&record(1, b"a")).unwrap();
        segment.seal(false).unwrap();
        assert!(segment.rollback_to(0, SEGMENT_HEADER_SIZE).is_err());
        assert_eq!(segment.len(), 1);
    }

    #[test]
    fn failed_trailer_leaves_segment_open() {
        let (provider, segment) = faulty();
        segment.append(&record(1, b"a")).unwrap();
        let data_end = segment.data_size();

        provider.fail_appends_after(0);
        assert!(segment.seal(false).is_err());
        assert!(!segment.is_sealed());
        assert_eq!(segment.data_size(), data_end);

        provider.heal();
        segment.append(&record(2, b"b")).unwrap();
        segment.seal(false).unwrap();
        let reopened = Segment::open(SegmentId::new(1), provider.open(1, 1).unwrap()).unwrap();
        assert!(reopened.is_sealed());
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn uncut_garbage_stays_outside_the_trailer() {
        let (provider, segment) = faulty();
        segment.append(&record(1, b"a")).unwrap();
        let (len, data_end) = (segment.len(), segment.data_size());
        segment.append(&record(2, b"orphan")).unwrap();

        provider.fail_truncates(true);
        assert!(segment.rollback_to(len, data_end).is_err());
        assert_eq!(segment.len(), 1);
        provider.heal();

        segment.seal(false).unwrap();
        let reopened = Segment::open(SegmentId::new(1), provider.open(1, 1).unwrap()).unwrap();
        assert_eq!(reopened.pkeys(..), vec![Pkey::new(1)]);
    }

    #[test]
    fn empty_segment_seals_and_reopens() {
        let (backend, segment) = fresh();
        assert_eq!(segment.seal(true).unwrap(), SegmentId::new(1));
        let reopened = Segment::open(SegmentId::new(1), backend).unwrap();
        assert!(reopened.is_sealed());
        assert!(reopened.is_empty());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let (backend, segment) = fresh();
        segment.append(&record(1, b"keep")).unwrap();
        let good_size = backend.size().unwrap();
        let torn = record(2, b"lost").encode().unwrap();
        backend.append(&torn[..torn.len() - 3]).unwrap();

        let reopened = Segment::open(SegmentId::new(1), backend.clone()).unwrap();
        assert!(!reopened.is_sealed());
        assert_eq!(reopened.len(), 1);
        assert_eq!(backend.size().unwrap(), good_size);
        reopened.append(&record(2, b"again")).unwrap();
    }

    #[test]
    fn corrupt_last_record_is_treated_as_torn() {
        let (backend, segment) = fresh();
        segment.append(&record(1, b"keep")).unwrap();
        segment.append(&record(2, b"bad")).unwrap();
        let mut bytes = backend.snapshot();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let reopened =
            Segment::open(SegmentId::new(1), Arc::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn corruption_before_valid_data_is_fatal() {
        let (backend, segment) = fresh();
        segment.append(&record(1, b"first")).unwrap();
        segment.append(&record(2, b"second")).unwrap();
        let mut bytes = backend.snapshot();
        bytes[SEGMENT_HEADER_SIZE as usize + 22] ^= 0xFF;

        let err =
            Segment::open(SegmentId::new(1), Arc::new(InMemoryBackend::with_data(bytes))).unwrap_err();
        assert!(matches!(err, CoreError::SegmentCorruption { .. }));
    }

    #[test]
    fn wrong_segment_id_is_rejected() {
        let (backend, _) = fresh();
        assert!(Segment::open(SegmentId::new(2), backend).is_err());
    }

    #[test]
    fn supersede_markers_drive_visibility() {
        let (_, segment) = fresh();
        segment.append(&record(1, b"v1")).unwrap();
        segment
            .append(&SegmentRecord::put(Pkey::new(2), Pkey::new(1), b"v2".to_vec()))
            .unwrap();
        assert!(segment.mark_superseded(Pkey::new(1), Pkey::new(2)));

        let old = segment.slot_state(Pkey::new(1)).unwrap();
        assert!(old.is_visible(Pkey::new(1), false));
        assert!(!old.is_visible(Pkey::new(2), false));
        assert!(old.is_visible(Pkey::new(2), true));
        assert!(segment.slot_state(Pkey::new(2)).unwrap().is_current());
    }

    #[test]
    fn scan_respects_range() {
        let (_, segment) = fresh();
        for pkey in 1..=5 {
            segment.append(&record(pkey, b"r")).unwrap();
        }
        let pkeys: Vec<_> = segment
            .scan(Pkey::new(2)..Pkey::new(4))
            .map(|r| r.unwrap().pkey.as_u64())
            .collect();
        assert_eq!(pkeys, vec![2, 3]);
        assert_eq!(segment.pkeys((Bound::Excluded(Pkey::new(4)), Bound::Unbounded)).len(), 1);
    }
}
