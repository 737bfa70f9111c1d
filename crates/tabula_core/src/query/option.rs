//! Query descriptors.

use crate::types::Pkey;
use std::ops::Bound;
use tabula_codec::{FieldMap, Value};

/// Selects rows through a secondary index.
///
/// Equality bindings must cover a leading prefix of the index's fields.
/// An optional range may constrain the field right after that prefix.
///
/// ```
/// use tabula_core::ReadOption;
///
/// let by_card = ReadOption::new().bind("card", "card2");
/// let named = ReadOption::on_index("card_date")
///     .bind("card", "card2")
///     .range("p_biz_date", 3i64..);
/// assert!(named.index.is_some());
/// assert!(by_card.index.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOption {
    /// Index to use. When `None`, the first index whose leading fields are
    /// exactly the bound fields is chosen.
    pub index: Option<String>,
    /// Equality bindings, field name to value.
    pub bindings: FieldMap,
    /// Optional range on the first unbound index field.
    pub range: Option<RangeBinding>,
    /// Also return superseded versions, newest first within a key.
    pub include_history: bool,
}

/// Range constraint on one index field.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBinding {
    /// Constrained field.
    pub field: String,
    /// Lower bound.
    pub lower: Bound<Value>,
    /// Upper bound.
    pub upper: Bound<Value>,
}

impl ReadOption {
    /// An option with no index and no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An option naming its index explicitly.
    pub fn on_index(name: impl Into<String>) -> Self {
        Self {
            index: Some(name.into()),
            ..Self::default()
        }
    }

    /// Builds an option from a condition map, leaving index choice to the
    /// executor.
    #[must_use]
    pub fn from_condition(condition: &FieldMap) -> Self {
        Self {
            bindings: condition.clone(),
            ..Self::default()
        }
    }

    /// Binds `field` to `value`.
    #[must_use]
    pub fn bind(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(field.into(), value.into());
        self
    }

    /// Constrains `field` to `range`. Open ends are allowed.
    #[must_use]
    pub fn range<V, R>(mut self, field: impl Into<String>, range: R) -> Self
    where
        V: Into<Value> + Clone,
        R: std::ops::RangeBounds<V>,
    {
        let convert = |b: Bound<&V>| match b {
            Bound::Included(v) => Bound::Included(v.clone().into()),
            Bound::Excluded(v) => Bound::Excluded(v.clone().into()),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.range = Some(RangeBinding {
            field: field.into(),
            lower: convert(range.start_bound()),
            upper: convert(range.end_bound()),
        });
        self
    }

    /// Includes superseded versions in the result.
    #[must_use]
    pub fn with_history(mut self) -> Self {
        self.include_history = true;
        self
    }
}

/// Paging for traversals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraverseOption {
    /// Resume after this pkey.
    pub start_after: Option<Pkey>,
    /// Maximum rows to return; `None` uses the database default.
    pub limit: Option<usize>,
}

impl TraverseOption {
    /// Traverse from the start with the default limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes after `pkey`, typically a previous cursor's
    /// [`last_pkey`](crate::ResultCursor::last_pkey).
    #[must_use]
    pub const fn after(mut self, pkey: Pkey) -> Self {
        self.start_after = Some(pkey);
        self
    }

    /// Caps the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
