//! Traverse command implementation.

use crate::commands::open_existing;
use serde_json::{Map, Number};
use std::io::{self, Write};
use std::path::Path;
use tabula_codec::Value;
use tabula_core::{Row, TraverseOption};

/// Converts a column value to plain JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::SmallInt(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::BigInt(v) | Value::Timestamp(v) => (*v).into(),
        Value::Float(v) => Number::from_f64(f64::from(*v)).map_or(serde_json::Value::Null, Into::into),
        Value::Double(v) => Number::from_f64(*v).map_or(serde_json::Value::Null, Into::into),
        Value::Varchar(v) => serde_json::Value::String(v.clone()),
    }
}

/// One row as a JSON object keyed by field name, plus `_pkey`.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    let mut object = Map::new();
    object.insert("_pkey".to_string(), row.pkey().as_u64().into());
    for (name, value) in row.fields() {
        object.insert(name.clone(), value_to_json(value));
    }
    serde_json::Value::Object(object)
}

/// Writes every live row of `table` to `out`, one JSON object per line.
/// Returns the number of rows written.
pub fn write_rows(
    path: &Path,
    table: &str,
    limit: Option<usize>,
    out: &mut dyn Write,
) -> Result<usize, Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let mut option = TraverseOption::new();
    if let Some(limit) = limit {
        option = option.limit(limit);
    }
    let mut written = 0;
    for row in db.connect().traverse_with(table, &option)? {
        writeln!(out, "{}", row_to_json(&row?))?;
        written += 1;
    }
    Ok(written)
}

/// Runs the traverse command.
pub fn run(path: &Path, table: &str, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_rows(path, table, limit, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_codec::{field_map, ColumnDef, DataType, Schema};
    use tabula_core::{Database, TableDef, WriteOptions};
    use tempfile::tempdir;

    #[test]
    fn rows_are_json_lines() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            let conn = db.connect();
            let schema = Schema::new(vec![
                ColumnDef::new("card", DataType::Varchar),
                ColumnDef::new("amt", DataType::Double),
            ])
            .unwrap();
            conn.create_table(TableDef::new("t", schema)).unwrap();
            for (card, amt) in [("a", 1.5), ("b", 2.0), ("c", 3.0)] {
                conn.put(
                    "t",
                    &field_map([("card", Value::from(card)), ("amt", Value::Double(amt))]),
                    &WriteOptions::default(),
                )
                .unwrap();
            }
        }

        let mut out = Vec::new();
        let n = write_rows(temp.path(), "t", Some(2), &mut out).unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["_pkey"], 1);
        assert_eq!(lines[0]["card"], "a");
        assert_eq!(lines[0]["amt"], 1.5);
        assert_eq!(lines[1]["card"], "b");
    }

    #[test]
    fn null_and_nan_become_json_null() {
        assert_eq!(value_to_json(&Value::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(&Value::Double(f64::NAN)), serde_json::Value::Null);
        assert_eq!(value_to_json(&Value::SmallInt(-3)), serde_json::json!(-3));
    }
}
