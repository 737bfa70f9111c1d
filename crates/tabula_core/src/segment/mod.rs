//! Segment storage for table records.
//!
//! Each table owns an ordered list of segments: zero or more sealed
//! segments followed by exactly one active segment. Records are appended
//! to the active segment; sealed segments are never modified on disk.
//!
//! ## Segment Record Format
//!
//! ```text
//! | record_len (4) | pkey (8) | lineage (8) | flags (1) | payload (N) | checksum (4) |
//! ```
//!
//! Flags:
//! - `0x01` = tombstone (deleted row)
//!
//! Updates never edit a record in place. A new version is appended with
//! the lineage of the row it replaces, and the old version's in-memory
//! `superseded_by` marker is pointed at it. The markers are rebuilt from
//! lineages when a table is opened.

mod file;
mod record;
mod store;

pub use file::{Segment, SegmentScan, SlotState};
pub use record::{SegmentRecord, SegmentRecordFlags};
pub(crate) use store::locate;
pub use store::{BatchMark, SegmentManager};
