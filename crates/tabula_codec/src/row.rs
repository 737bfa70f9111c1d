//! Binary row layout.
//!
//! ```text
//! | version (1) | null bitmap (ceil(n/8)) | slot 0 | slot 1 | ... | var data |
//! ```
//!
//! Slots are little-endian and sit at offsets fixed by the schema. A varchar
//! slot holds `(offset u32, len u32)` relative to the start of the var data.
//! Null columns set their bitmap bit and leave the slot zeroed, so equal
//! records always encode to equal bytes.

use crate::error::{CodecError, CodecResult};
use crate::schema::{Record, Schema};
use crate::value::{DataType, Value};
use bytes::{BufMut, BytesMut};

/// Current row format version.
pub const ROW_FORMAT_VERSION: u8 = 1;

/// Encodes `record` under `schema`.
///
/// The record is validated first; a value of the wrong type class or a null
/// in a not-null column fails with [`CodecError::SchemaMismatch`].
pub fn encode(record: &Record, schema: &Schema) -> CodecResult<Vec<u8>> {
    let record = schema.conform(record)?;
    let mut buf = BytesMut::zeroed(schema.fixed_len());
    let mut var = Vec::new();
    buf[0] = ROW_FORMAT_VERSION;

    for (idx, value) in record.values().iter().enumerate() {
        let slot = schema.slot(idx);
        match value {
            Value::Null => buf[1 + idx / 8] |= 1 << (idx % 8),
            Value::Bool(v) => buf[slot] = u8::from(*v),
            Value::SmallInt(v) => buf[slot..slot + 2].copy_from_slice(&v.to_le_bytes()),
            Value::Int(v) => buf[slot..slot + 4].copy_from_slice(&v.to_le_bytes()),
            Value::Float(v) => buf[slot..slot + 4].copy_from_slice(&v.to_le_bytes()),
            Value::BigInt(v) | Value::Timestamp(v) => {
                buf[slot..slot + 8].copy_from_slice(&v.to_le_bytes());
            }
            Value::Double(v) => buf[slot..slot + 8].copy_from_slice(&v.to_le_bytes()),
            Value::Varchar(s) => {
                let field = &schema.columns()[idx].name;
                let offset = u32::try_from(var.len())
                    .map_err(|_| CodecError::mismatch(field, "row under 4 GiB", "larger row"))?;
                let len = u32::try_from(s.len())
                    .map_err(|_| CodecError::mismatch(field, "varchar under 4 GiB", "larger"))?;
                buf[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
                buf[slot + 4..slot + 8].copy_from_slice(&len.to_le_bytes());
                var.extend_from_slice(s.as_bytes());
            }
        }
    }

    buf.put_slice(&var);
    Ok(buf.to_vec())
}

/// Decodes every column of an encoded row.
pub fn decode(data: &[u8], schema: &Schema) -> CodecResult<Record> {
    let view = RowView::new(schema, data)?;
    (0..schema.len())
        .map(|idx| view.get(idx))
        .collect::<CodecResult<Vec<_>>>()
        .map(Record::new)
}

/// Random access to the columns of one encoded row.
///
/// Reading a column touches only its slot (and, for varchar, its var
/// bytes), so index keys can be built without decoding the whole row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a Schema,
    data: &'a [u8],
}

impl<'a> RowView<'a> {
    /// Checks the version byte and fixed-part length.
    pub fn new(schema: &'a Schema, data: &'a [u8]) -> CodecResult<Self> {
        if data.len() < schema.fixed_len() {
            return Err(CodecError::Truncated {
                needed: schema.fixed_len(),
                available: data.len(),
            });
        }
        if data[0] != ROW_FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(data[0]));
        }
        Ok(Self { schema, data })
    }

    /// Whether column `idx` is null.
    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        self.data[1 + idx / 8] & (1 << (idx % 8)) != 0
    }

    /// Reads column `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a column of the schema.
    pub fn get(&self, idx: usize) -> CodecResult<Value> {
        debug_assert!(idx < self.schema.len());
        if self.is_null(idx) {
            return Ok(Value::Null);
        }
        let slot = self.schema.slot(idx);
        let column = &self.schema.columns()[idx];
        let value = match column.data_type {
            DataType::Bool => Value::Bool(self.data[slot] != 0),
            DataType::SmallInt => Value::SmallInt(i16::from_le_bytes(self.fixed::<2>(slot))),
            DataType::Int => Value::Int(i32::from_le_bytes(self.fixed::<4>(slot))),
            DataType::Float => Value::Float(f32::from_le_bytes(self.fixed::<4>(slot))),
            DataType::BigInt => Value::BigInt(i64::from_le_bytes(self.fixed::<8>(slot))),
            DataType::Timestamp => Value::Timestamp(i64::from_le_bytes(self.fixed::<8>(slot))),
            DataType::Double => Value::Double(f64::from_le_bytes(self.fixed::<8>(slot))),
            DataType::Varchar => {
                let offset = u32::from_le_bytes(self.fixed::<4>(slot)) as usize;
                let len = u32::from_le_bytes(self.fixed::<4>(slot + 4)) as usize;
                let start = self.schema.fixed_len() + offset;
                let end = start + len;
                if end > self.data.len() {
                    return Err(CodecError::Truncated {
                        needed: end,
                        available: self.data.len(),
                    });
                }
                let s = std::str::from_utf8(&self.data[start..end]).map_err(|_| {
                    CodecError::InvalidUtf8 {
                        field: column.name.clone(),
                    }
                })?;
                Value::Varchar(s.to_string())
            }
        };
        Ok(value)
    }

    fn fixed<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[at..at + N]);
        out
    }
}
