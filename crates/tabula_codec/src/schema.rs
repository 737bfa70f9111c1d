//! Table schemas and schema-conforming records.

use crate::error::{CodecError, CodecResult};
use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Caller-supplied field map: column name to value.
pub type FieldMap = BTreeMap<String, Value>;

/// Builds a [`FieldMap`] from name/value pairs.
///
/// ```
/// use tabula_codec::{field_map, Value};
///
/// let fields = field_map([("card", Value::from("card2")), ("p_biz_date", Value::from(3i64))]);
/// assert_eq!(fields.len(), 2);
/// ```
pub fn field_map<K, V, I>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within the schema.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
    /// Whether null is rejected.
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnDef {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: false,
        }
    }

    /// Marks the column as not-null.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// An ordered, immutable list of typed columns.
///
/// The schema also fixes the row layout: every column owns a slot at a
/// constant offset, computed once here and shared by the row builder and
/// row views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnDef>", into = "Vec<ColumnDef>")]
pub struct Schema {
    columns: Vec<ColumnDef>,
    slots: Vec<usize>,
    fixed_len: usize,
}

impl Schema {
    /// Builds a schema, rejecting empty column lists and duplicate names.
    pub fn new(columns: Vec<ColumnDef>) -> CodecResult<Self> {
        if columns.is_empty() {
            return Err(CodecError::invalid_schema("schema has no columns"));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(CodecError::invalid_schema("column name is empty"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(CodecError::invalid_schema(format!(
                    "duplicate column `{}`",
                    column.name
                )));
            }
        }

        let mut offset = 1 + columns.len().div_ceil(8);
        let mut slots = Vec::with_capacity(columns.len());
        for column in &columns {
            slots.push(offset);
            offset += column.data_type.slot_width();
        }

        Ok(Self {
            columns,
            slots,
            fixed_len: offset,
        })
    }

    /// The columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; a schema has at least one column.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column at `idx`.
    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&ColumnDef> {
        self.columns.get(idx)
    }

    /// Position of the column called `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Byte offset of the null bitmap's end, i.e. the first slot.
    #[must_use]
    pub(crate) fn header_len(&self) -> usize {
        1 + self.columns.len().div_ceil(8)
    }

    /// Byte offset of column `idx`'s slot.
    #[must_use]
    pub(crate) fn slot(&self, idx: usize) -> usize {
        self.slots[idx]
    }

    /// Length of the fixed part of every encoded row.
    #[must_use]
    pub fn fixed_len(&self) -> usize {
        self.fixed_len
    }

    /// Coerces `value` for the column called `name`.
    ///
    /// Returns the column position with the converted value.
    pub fn coerce_field(&self, name: &str, value: &Value) -> CodecResult<(usize, Value)> {
        let idx = self.position(name).ok_or_else(|| CodecError::UnknownField {
            field: name.to_string(),
        })?;
        Ok((idx, self.coerce_at(idx, value)?))
    }

    fn coerce_at(&self, idx: usize, value: &Value) -> CodecResult<Value> {
        let column = &self.columns[idx];
        if value.is_null() {
            if column.not_null {
                return Err(CodecError::mismatch(
                    &column.name,
                    format!("non-null {}", column.data_type),
                    "null",
                ));
            }
            return Ok(Value::Null);
        }
        value.coerce(column.data_type).ok_or_else(|| {
            CodecError::mismatch(&column.name, column.data_type.name(), value.type_name())
        })
    }

    /// Validates a field map and lays it out in schema order.
    ///
    /// Unknown names are rejected. Absent nullable columns become null;
    /// absent not-null columns are [`CodecError::MissingField`].
    pub fn record_from_fields(&self, fields: &FieldMap) -> CodecResult<Record> {
        for name in fields.keys() {
            if self.position(name).is_none() {
                return Err(CodecError::UnknownField {
                    field: name.clone(),
                });
            }
        }
        let mut values = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            match fields.get(&column.name) {
                Some(value) => values.push(self.coerce_at(idx, value)?),
                None if column.not_null => {
                    return Err(CodecError::MissingField {
                        field: column.name.clone(),
                    })
                }
                None => values.push(Value::Null),
            }
        }
        Ok(Record(values))
    }

    /// Checks arity, types and nullability, returning the coerced record.
    pub fn conform(&self, record: &Record) -> CodecResult<Record> {
        if record.len() != self.columns.len() {
            return Err(CodecError::ArityMismatch {
                expected: self.columns.len(),
                actual: record.len(),
            });
        }
        record
            .values()
            .iter()
            .enumerate()
            .map(|(idx, v)| self.coerce_at(idx, v))
            .collect::<CodecResult<Vec<_>>>()
            .map(Record)
    }

    /// Pairs each value with its column name, in schema order.
    #[must_use]
    pub fn named(&self, record: &Record) -> Vec<(String, Value)> {
        self.columns
            .iter()
            .zip(record.values())
            .map(|(c, v)| (c.name.clone(), v.clone()))
            .collect()
    }
}

impl TryFrom<Vec<ColumnDef>> for Schema {
    type Error = CodecError;

    fn try_from(columns: Vec<ColumnDef>) -> CodecResult<Self> {
        Self::new(columns)
    }
}

impl From<Schema> for Vec<ColumnDef> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

/// A row's values in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<Value>);

impl Record {
    /// Wraps values that are already in schema order.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Values in schema order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Value at column `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    /// Replaces the value at column `idx`.
    pub fn set(&mut self, idx: usize, value: Value) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = value;
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the record holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the value vector.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("card", DataType::Varchar).not_null(),
            ColumnDef::new("mcc", DataType::Varchar),
            ColumnDef::new("p_biz_date", DataType::BigInt),
        ])
        .unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn slots_have_constant_offsets() {
        let schema = card_schema();
        // 1 version byte + 1 bitmap byte, then three 8-byte slots.
        assert_eq!(schema.slot(0), 2);
        assert_eq!(schema.slot(1), 10);
        assert_eq!(schema.slot(2), 18);
        assert_eq!(schema.fixed_len(), 26);
    }

    #[test]
    fn field_map_is_reordered_and_coerced() {
        let schema = card_schema();
        let record = schema
            .record_from_fields(&fields(&[
                ("p_biz_date", Value::Int(3)),
                ("card", Value::from("card2")),
            ]))
            .unwrap();
        assert_eq!(
            record.values(),
            &[Value::from("card2"), Value::Null, Value::BigInt(3)]
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = card_schema()
            .record_from_fields(&fields(&[
                ("card", Value::from("c")),
                ("amount", Value::Int(1)),
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownField {
                field: "amount".into()
            }
        );
    }

    #[test]
    fn missing_not_null_field_is_rejected() {
        let err = card_schema()
            .record_from_fields(&fields(&[("mcc", Value::from("m"))]))
            .unwrap_err();
        assert_eq!(err.field(), Some("card"));
        assert!(matches!(err, CodecError::MissingField { .. }));
    }

    #[test]
    fn wrong_type_class_is_a_mismatch() {
        let err = card_schema()
            .record_from_fields(&fields(&[
                ("card", Value::from("c")),
                ("p_biz_date", Value::from("tomorrow")),
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::mismatch("p_biz_date", "bigint", "varchar")
        );
    }

    #[test]
    fn explicit_null_on_not_null_column_is_a_mismatch() {
        let err = card_schema()
            .conform(&Record::new(vec![Value::Null, Value::Null, Value::Null]))
            .unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { ref field, .. } if field == "card"));
    }

    #[test]
    fn schema_rejects_duplicates_and_empty() {
        assert!(Schema::new(Vec::new()).is_err());
        assert!(Schema::new(vec![
            ColumnDef::new("a", DataType::Int),
            ColumnDef::new("a", DataType::Bool),
        ])
        .is_err());
    }

    #[test]
    fn arity_is_checked() {
        let err = card_schema()
            .conform(&Record::new(vec![Value::from("x")]))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::ArityMismatch {
                expected: 3,
                actual: 1
            }
        );
    }
}
