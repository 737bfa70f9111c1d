//! Storage backend trait definition.

use crate::error::StorageResult;

/// A single append-only byte store.
///
/// Each Tabula segment is backed by exactly one `StorageBackend`. The
/// backend is opaque: it never interprets the bytes it holds.
///
/// All methods take `&self`. Implementations synchronize internally so a
/// segment can be read by many threads while its single writer appends.
///
/// # Invariants
///
/// - `append` returns the offset of the first written byte, and that
///   offset equals `size()` observed just before the call
/// - bytes returned by `read_at` never change once appended, except through
///   an explicit `truncate`
/// - `sync` makes every previously appended byte durable
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range is not fully inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&self) -> StorageResult<()>;

    /// Flushes and waits until data and metadata are on durable media.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the number of bytes in the store.
    fn size(&self) -> StorageResult<u64>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Used on recovery to cut a torn record off the tail of an unsealed
    /// segment.
    fn truncate(&self, new_size: u64) -> StorageResult<()>;

    /// Reads everything from `offset` to the end of the store.
    fn read_from(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = size.saturating_sub(offset);
        self.read_at(offset, len as usize)
    }
}
