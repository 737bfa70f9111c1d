//! Query execution.
//!
//! A [`ReadOption`] names equality bindings (and optionally a range) on a
//! table's fields. The planner resolves it to one index scan, the index
//! yields candidate pkeys, and a [`ResultCursor`] filters them against the
//! segment version chain as it is iterated.

mod cursor;
mod option;
mod plan;

pub use cursor::{ResultCursor, Row};
pub use option::{RangeBinding, ReadOption, TraverseOption};
pub use plan::{plan, ScanPlan};
