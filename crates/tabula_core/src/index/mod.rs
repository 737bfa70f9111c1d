//! Secondary indexes.
//!
//! Every table declares zero or more indexes, each an ordered tuple of
//! column names. An index maps the memcomparable encoding of those columns
//! to the pkeys of the record versions that carried them.
//!
//! Indexes are:
//! - Declared at table creation, immutable afterwards
//! - Maintained by the table writer after each append succeeds
//! - Held in memory and rebuilt from segments when a table is opened
//!
//! Old entries are not removed when a row is updated or deleted; readers
//! filter superseded versions through the segment version chain.

mod btree;
mod manager;
mod traits;

pub use btree::BTreeIndex;
pub use manager::IndexManager;
pub use traits::{Index, IndexDef, IndexKind, KeyRange};
