//! # Tabula Core
//!
//! Core table engine for Tabula.
//!
//! This crate provides:
//! - Segment storage: append-only record files, sealed into immutable,
//!   trailer-indexed segments
//! - Secondary indexes over memcomparable keys, rebuilt on open
//! - Query planning and lazy, snapshot-consistent result cursors
//! - A per-table write coordinator with versioned, non-destructive updates
//! - The [`Database`] facade and its [`Connection`] handles
//!
//! ## Usage
//!
//! ```
//! use tabula_codec::{field_map, ColumnDef, DataType, Schema, Value};
//! use tabula_core::{Database, IndexDef, ReadOption, TableDef, WriteOptions};
//!
//! let db = Database::open_in_memory().unwrap();
//! let conn = db.connect();
//!
//! let schema = Schema::new(vec![
//!     ColumnDef::new("card", DataType::Varchar),
//!     ColumnDef::new("mcc", DataType::Varchar),
//!     ColumnDef::new("p_biz_date", DataType::BigInt),
//! ])
//! .unwrap();
//! conn.create_table(TableDef::new("test1", schema).with_index(IndexDef::new("card", ["card"])))
//!     .unwrap();
//!
//! let row = field_map([
//!     ("card", Value::from("card2")),
//!     ("mcc", Value::from("mcc0")),
//!     ("p_biz_date", Value::from(3)),
//! ]);
//! conn.put("test1", &row, &WriteOptions::default()).unwrap();
//!
//! let mut cursor = conn
//!     .query("test1", &ReadOption::new().bind("card", "card2"))
//!     .unwrap();
//! assert_eq!(cursor.count_matches().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod database;
pub mod dir;
mod error;
mod index;
mod query;
mod segment;
mod stats;
mod table;
mod types;

pub use catalog::{Catalog, CATALOG_MAGIC, CATALOG_VERSION};
pub use config::{Config, Consistency, WriteOptions};
pub use database::{Connection, Database};
pub use error::{CoreError, CoreResult};
pub use index::{BTreeIndex, Index, IndexDef, IndexKind, IndexManager, KeyRange};
pub use query::{plan, RangeBinding, ReadOption, ResultCursor, Row, ScanPlan, TraverseOption};
pub use segment::{BatchMark, Segment, SegmentManager, SegmentRecord, SegmentRecordFlags, SegmentScan, SlotState};
pub use stats::{DatabaseStats, StatsSnapshot, TableStats};
pub use table::{Table, TableDef};
pub use types::{Pkey, SegmentId, TableId};
