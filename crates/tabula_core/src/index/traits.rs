//! Index definitions and the index trait.

use crate::types::Pkey;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Whether an index admits several current records per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// At most one current record per key.
    Unique,
    /// Any number of records per key.
    #[default]
    NonUnique,
}

/// Declaration of a secondary index: an ordered tuple of column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its table.
    pub name: String,
    /// Indexed columns, most significant first.
    pub fields: Vec<String>,
    /// Uniqueness.
    #[serde(default)]
    pub kind: IndexKind,
}

impl IndexDef {
    /// Creates a non-unique index over `fields`.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            kind: IndexKind::NonUnique,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.kind = IndexKind::Unique;
        self
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }
}

/// A byte range over encoded index keys.
///
/// Every key in the range starts with `prefix`. `lower` and `upper`, when
/// bounded, are `prefix` followed by one more encoded component; keys that
/// extend a bound (further components) count as equal to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Bytes every matching key starts with.
    pub prefix: Vec<u8>,
    /// Lower bound on the next component.
    pub lower: Bound<Vec<u8>>,
    /// Upper bound on the next component.
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    /// All keys starting with `prefix`. A full key selects exactly itself.
    #[must_use]
    pub fn prefix(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Whether `key` lies in the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix) && self.above_lower(key) && self.below_upper(key)
    }

    pub(crate) fn above_lower(&self, key: &[u8]) -> bool {
        match &self.lower {
            Bound::Included(l) => key >= l.as_slice(),
            Bound::Excluded(l) => key > l.as_slice() && !key.starts_with(l),
            Bound::Unbounded => true,
        }
    }

    pub(crate) fn below_upper(&self, key: &[u8]) -> bool {
        match &self.upper {
            Bound::Included(u) => key < u.as_slice() || key.starts_with(u),
            Bound::Excluded(u) => key < u.as_slice(),
            Bound::Unbounded => true,
        }
    }

    /// Smallest key that can lie in the range.
    #[must_use]
    pub(crate) fn start(&self) -> &[u8] {
        match &self.lower {
            Bound::Included(l) | Bound::Excluded(l) => l,
            Bound::Unbounded => &self.prefix,
        }
    }
}

/// Core index trait.
///
/// Keys are memcomparable byte strings; an index maps each key to the
/// pkeys of the record versions that carried it.
pub trait Index: Send + Sync {
    /// Returns the index definition.
    fn def(&self) -> &IndexDef;

    /// Adds a key-pkey entry. Re-inserting an existing entry is a no-op.
    fn insert(&mut self, key: Vec<u8>, pkey: Pkey);

    /// Removes a key-pkey entry, returning whether it existed.
    fn remove(&mut self, key: &[u8], pkey: Pkey) -> bool;

    /// Pkeys stored under exactly `key`, newest first.
    fn lookup(&self, key: &[u8]) -> Vec<Pkey>;

    /// Pkeys of every entry in `range`, in key order and newest first
    /// within a key.
    fn scan(&self, range: &KeyRange) -> Vec<Pkey>;

    /// Checks if the index contains a key.
    fn contains(&self, key: &[u8]) -> bool;

    /// Every entry, in index order.
    fn entries(&self) -> Vec<(Vec<u8>, Pkey)>;

    /// Returns the number of entries in the index.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
