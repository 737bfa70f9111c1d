//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while validating, encoding or decoding rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value does not fit the declared column type.
    #[error("field `{field}`: expected {expected}, got {actual}")]
    SchemaMismatch {
        /// Column name.
        field: String,
        /// Declared type (or constraint).
        expected: String,
        /// What the caller supplied.
        actual: String,
    },

    /// A field name is not declared by the schema.
    #[error("unknown field `{field}`")]
    UnknownField {
        /// The offending name.
        field: String,
    },

    /// A `not_null` column received no value.
    #[error("missing value for not-null field `{field}`")]
    MissingField {
        /// Column name.
        field: String,
    },

    /// A record carries the wrong number of values.
    #[error("record has {actual} values, schema declares {expected} columns")]
    ArityMismatch {
        /// Columns in the schema.
        expected: usize,
        /// Values in the record.
        actual: usize,
    },

    /// The encoded row ends before the layout says it should.
    #[error("row truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the layout requires.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// A varchar column holds invalid UTF-8.
    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 {
        /// Column name.
        field: String,
    },

    /// The row was written by an unknown format version.
    #[error("unsupported row format version {0}")]
    UnsupportedVersion(u8),

    /// The schema definition itself is invalid.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Why.
        message: String,
    },

    /// Metadata (de)serialization failed.
    #[error("cbor: {message}")]
    Cbor {
        /// Underlying error text.
        message: String,
    },
}

impl CodecError {
    /// Creates a schema mismatch error.
    pub fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Name of the field this error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::SchemaMismatch { field, .. }
            | Self::UnknownField { field }
            | Self::MissingField { field }
            | Self::InvalidUtf8 { field } => Some(field),
            _ => None,
        }
    }
}
