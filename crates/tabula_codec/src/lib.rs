//! # Tabula Codec
//!
//! Typed rows for Tabula tables.
//!
//! - [`Schema`] declares an ordered list of typed [`ColumnDef`]s and fixes
//!   the row layout.
//! - [`encode`] / [`decode`] convert a [`Record`] to and from its compact
//!   binary row. [`RowView`] reads single columns in O(1).
//! - [`encode_key`] produces order-preserving, prefix-free index keys.
//! - [`to_cbor`] / [`from_cbor`] persist metadata such as schemas.
//!
//! ## Usage
//!
//! ```
//! use tabula_codec::{decode, encode, ColumnDef, DataType, FieldMap, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     ColumnDef::new("card", DataType::Varchar).not_null(),
//!     ColumnDef::new("p_biz_date", DataType::BigInt),
//! ])
//! .unwrap();
//!
//! let mut fields = FieldMap::new();
//! fields.insert("card".into(), Value::from("card2"));
//! fields.insert("p_biz_date".into(), Value::from(3));
//!
//! let record = schema.record_from_fields(&fields).unwrap();
//! let bytes = encode(&record, &schema).unwrap();
//! assert_eq!(decode(&bytes, &schema).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod key;
mod row;
mod schema;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use key::{encode_key, encode_key_component};
pub use row::{decode, encode, RowView, ROW_FORMAT_VERSION};
pub use schema::{field_map, ColumnDef, FieldMap, Record, Schema};
pub use value::{DataType, Value};
