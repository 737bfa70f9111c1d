//! Seal command implementation.

use crate::commands::open_existing;
use std::path::Path;
use tracing::info;

/// Runs the seal command.
pub fn run(path: &Path, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let id = db.connect().seal(table)?;
    db.close()?;
    info!(table, segment = %id, "sealed from cli");
    println!("Sealed {table} segment {id}");
    Ok(())
}
