//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends and providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the last appended byte.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation was asked to grow the store.
    #[error("cannot truncate to {requested} bytes, store holds only {size}")]
    TruncateBeyondEnd {
        /// The requested size.
        requested: u64,
        /// The current size.
        size: u64,
    },

    /// The backend was already created for this segment.
    #[error("segment {segment} of table {table} already exists")]
    AlreadyExists {
        /// Table id.
        table: u32,
        /// Segment id.
        segment: u64,
    },

    /// No backend exists for this segment.
    #[error("segment {segment} of table {table} not found")]
    NotFound {
        /// Table id.
        table: u32,
        /// Segment id.
        segment: u64,
    },
}
