//! Inspect command implementation.

use crate::commands::open_existing;
use crate::Format;
use serde::Serialize;
use std::path::Path;
use tabula_core::{StatsSnapshot, TableStats};

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Tables in creation order.
    pub tables: Vec<TableInfo>,
    /// Counters for this process (opening rebuilds, it does not write).
    pub operations: StatsSnapshot,
}

/// One table's declaration and statistics.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns in schema order.
    pub columns: Vec<ColumnInfo>,
    /// Indexes in declaration order.
    pub indexes: Vec<IndexInfo>,
    /// Structural statistics.
    pub stats: TableStats,
}

/// One column.
#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub data_type: String,
    /// Whether null is rejected.
    pub not_null: bool,
}

/// One index.
#[derive(Debug, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed fields.
    pub fields: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

/// Collects the inspection result.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let conn = db.connect();

    let mut tables = Vec::new();
    for name in conn.list_tables()? {
        let def = conn.table_def(&name)?;
        tables.push(TableInfo {
            columns: def
                .schema
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    data_type: c.data_type.to_string(),
                    not_null: c.not_null,
                })
                .collect(),
            indexes: def
                .indexes
                .iter()
                .map(|i| IndexInfo {
                    name: i.name.clone(),
                    fields: i.fields.clone(),
                    unique: i.is_unique(),
                })
                .collect(),
            stats: conn.stats(&name)?,
            name,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        tables,
        operations: db.stats(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Tabula Database Inspection");
    println!("==========================");
    println!();
    println!("Path:   {}", result.path);
    println!("Tables: {}", result.tables.len());

    for table in &result.tables {
        println!();
        println!("[{}]", table.name);
        println!("  Columns:");
        for col in &table.columns {
            let null = if col.not_null { " not null" } else { "" };
            println!("    {} {}{}", col.name, col.data_type, null);
        }
        if !table.indexes.is_empty() {
            println!("  Indexes:");
            for idx in &table.indexes {
                let unique = if idx.unique { " (unique)" } else { "" };
                println!("    {} on ({}){}", idx.name, idx.fields.join(", "), unique);
            }
        }
        let s = &table.stats;
        println!("  Records:");
        println!("    Live:       {}", s.live_records);
        println!("    Stored:     {}", s.total_records);
        println!("    Tombstones: {}", s.tombstones);
        println!("  Segments:");
        println!("    Sealed:         {}", s.sealed_segments);
        println!("    Active records: {}", s.active_records);
        println!("  Index entries: {}", s.index_entries);
        println!("  Watermark:     {}", s.watermark);
    }
}
