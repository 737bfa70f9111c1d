//! Error types for Tabula core.

use std::io;
use tabula_codec::CodecError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tabula core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tabula_storage::StorageError),

    /// Row or key codec error without table context.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A field value does not fit its column.
    #[error("schema mismatch in table `{table}`, field `{field}`: expected {expected}, got {actual}")]
    SchemaMismatch {
        /// Table the write targeted.
        table: String,
        /// Offending field.
        field: String,
        /// What the column accepts.
        expected: String,
        /// What was supplied.
        actual: String,
    },

    /// A field name is not a column of the table.
    #[error("table `{table}` has no field `{field}`")]
    UnknownField {
        /// Table the request targeted.
        table: String,
        /// The unknown name.
        field: String,
    },

    /// A not-null field was absent.
    #[error("table `{table}` requires field `{field}`")]
    MissingField {
        /// Table the write targeted.
        table: String,
        /// The absent field.
        field: String,
    },

    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the table.
        name: String,
    },

    /// A table with this name already exists.
    #[error("table already exists: {name}")]
    TableExists {
        /// Name of the table.
        name: String,
    },

    /// No index matches the request.
    #[error("index not found in table `{table}`: {index}")]
    IndexNotFound {
        /// Table searched.
        table: String,
        /// Requested index name, or the bound field set when none was named.
        index: String,
    },

    /// A read option does not fit the index it resolved to.
    #[error("invalid read option for index `{index}` of table `{table}`: {message}")]
    InvalidReadOption {
        /// Table searched.
        table: String,
        /// Resolved index.
        index: String,
        /// What is wrong with the bindings.
        message: String,
    },

    /// A unique index already holds a current record with this key.
    #[error("duplicate key in unique index `{index}` of table `{table}`")]
    DuplicateKey {
        /// Table the write targeted.
        table: String,
        /// The unique index.
        index: String,
    },

    /// Seal attempted while an append was in flight; retry after it completes.
    #[error("segment {segment} has an append in flight")]
    ConcurrentAppend {
        /// The segment being sealed.
        segment: u64,
    },

    /// An index entry refers to a record that does not exist.
    #[error("integrity error in table `{table}`: {message}")]
    Integrity {
        /// Table checked.
        table: String,
        /// Description of the dangling reference.
        message: String,
    },

    /// The writer lock could not be taken within the requested timeout.
    #[error("timed out after {millis} ms waiting for the writer of table `{table}`")]
    Timeout {
        /// Table the write targeted.
        table: String,
        /// Timeout that elapsed.
        millis: u128,
    },

    /// Segment is corrupted or invalid.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Catalog file could not be decoded.
    #[error("catalog error: {message}")]
    Catalog {
        /// Description of the problem.
        message: String,
    },

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Attaches the table name to schema-level codec errors.
    pub fn from_codec(table: &str, err: CodecError) -> Self {
        match err {
            CodecError::SchemaMismatch {
                field,
                expected,
                actual,
            } => Self::SchemaMismatch {
                table: table.to_string(),
                field,
                expected,
                actual,
            },
            CodecError::UnknownField { field } => Self::UnknownField {
                table: table.to_string(),
                field,
            },
            CodecError::MissingField { field } => Self::MissingField {
                table: table.to_string(),
                field,
            },
            other => Self::Codec(other),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// True for races the caller may simply retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrentAppend { .. } | Self::Timeout { .. })
    }

    /// True for caller errors in field names, types or nullability.
    ///
    /// These are always raised before any mutation.
    #[must_use]
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. } | Self::UnknownField { .. } | Self::MissingField { .. }
        )
    }
}
