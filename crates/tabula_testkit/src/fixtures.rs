//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use std::path::Path;
use tabula_core::{Config, Database};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates a new in-memory test database with custom configuration.
    pub fn memory_with_config(config: Config) -> Self {
        Self {
            db: Database::open_in_memory_with_config(config)
                .expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new database in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a new database in a temporary directory with custom
    /// configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(temp_dir.path(), config)
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes and reopens a file-based database, keeping its directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which cannot be reopened.
    pub fn reopen(self) -> Self {
        let config = self.db.config().clone();
        let Self { db, temp_dir } = self;
        let temp_dir = temp_dir.expect("In-memory databases cannot be reopened");
        db.close().expect("Failed to close database");
        drop(db);
        let db = Database::open_with_config(temp_dir.path(), config)
            .expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use tabula_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         let conn = db.connect();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a database in a temporary directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use tabula_codec::{field_map, ColumnDef, DataType, FieldMap, Schema, Value};
    use tabula_core::{IndexDef, TableDef, WriteOptions};

    /// The card table: `card`, `mcc`, `p_biz_date`, with an index on `card`
    /// and a composite index on `(card, p_biz_date)`.
    pub fn card_table(name: &str) -> TableDef {
        let schema = Schema::new(vec![
            ColumnDef::new("card", DataType::Varchar).not_null(),
            ColumnDef::new("mcc", DataType::Varchar),
            ColumnDef::new("p_biz_date", DataType::BigInt),
        ])
        .expect("Invalid card schema");
        TableDef::new(name, schema)
            .with_index(IndexDef::new("card", ["card"]))
            .with_index(IndexDef::new("card_date", ["card", "p_biz_date"]))
    }

    /// One card row.
    pub fn card_row(card: &str, mcc: &str, p_biz_date: i64) -> FieldMap {
        field_map([
            ("card", Value::from(card)),
            ("mcc", Value::from(mcc)),
            ("p_biz_date", Value::BigInt(p_biz_date)),
        ])
    }

    /// Creates a database whose `test1` card table holds `rows` rows
    /// spread over ten cards (`card0` .. `card9`).
    pub fn cards_database(rows: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let conn = test_db.connect();
        conn.create_table(card_table("test1"))
            .expect("Failed to create table");
        for i in 0..rows {
            let row = card_row(&format!("card{}", i % 10), &format!("mcc{}", i % 3), i as i64);
            conn.put("test1", &row, &WriteOptions::relaxed())
                .expect("Failed to put row");
        }
        test_db
    }
}
