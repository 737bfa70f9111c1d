//! Verify command implementation.

use crate::commands::open_existing;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of tables checked.
    pub tables_checked: usize,
    /// Number of records checked.
    pub records_checked: usize,
    /// Failures, one per table.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks every table, collecting failures rather than stopping at the
/// first one.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let conn = db.connect();
    let mut result = VerifyResult::default();

    for name in conn.list_tables()? {
        result.tables_checked += 1;
        match conn.verify(&name) {
            Ok(records) => result.records_checked += records,
            Err(e) => result.errors.push(format!("{name}: {e}")),
        }
    }
    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {}", path.display());
    println!();

    let result = verify(path)?;
    println!("  Tables checked:  {}", result.tables_checked);
    println!("  Records checked: {}", result.records_checked);
    for error in &result.errors {
        println!("  Error: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}
