//! Database directory management.
//!
//! This module handles the file system layout for Tabula:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ CATALOG           # Table definitions
//! └─ tables/
//!    └─ <table id>/
//!       └─ <segment id:016x>.seg
//! ```
//!
//! The LOCK file ensures only one process can open the database at a time.
//! The CATALOG file persists table definitions across restarts.

use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tabula_storage::DirectoryProvider;

/// File names within the database directory.
const CATALOG_FILE: &str = "CATALOG";
const LOCK_FILE: &str = "LOCK";
/// Root of the per-table segment directories.
const TABLES_DIR: &str = "tables";
/// Temporary file for atomic catalog writes.
const CATALOG_TEMP: &str = "CATALOG.tmp";

/// Manages the database directory structure and file locking.
///
/// # Thread Safety
///
/// The `DatabaseDir` holds an exclusive lock on the database directory.
/// Only one `DatabaseDir` instance can exist per directory at a time.
///
/// # Example
///
/// ```rust,ignore
/// use tabula_core::dir::DatabaseDir;
/// use std::path::Path;
///
/// let dir = DatabaseDir::open(Path::new("my_db"), true)?;
/// println!("tables under: {:?}", dir.tables_dir());
/// ```
#[derive(Debug)]
pub struct DatabaseDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        // Non-blocking: a held lock means another open database.
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the CATALOG file.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.path.join(CATALOG_FILE)
    }

    /// Returns the root of the per-table segment directories.
    #[must_use]
    pub fn tables_dir(&self) -> PathBuf {
        self.path.join(TABLES_DIR)
    }

    /// A segment provider rooted at [`tables_dir`](Self::tables_dir).
    #[must_use]
    pub fn provider(&self) -> DirectoryProvider {
        DirectoryProvider::new(self.tables_dir())
    }

    /// Checks if this is a new (empty) database directory.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        !self.catalog_path().exists()
    }

    /// Loads the catalog from disk.
    ///
    /// Returns `None` if the catalog file doesn't exist (new database).
    pub fn load_catalog(&self) -> CoreResult<Option<Catalog>> {
        let catalog_path = self.catalog_path();
        if !catalog_path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&catalog_path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        Catalog::decode(&data).map(Some)
    }

    /// Saves the catalog to disk atomically.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to temporary file
    /// 2. Sync temporary file to disk
    /// 3. Rename temporary file to CATALOG
    /// 4. Fsync the directory so the rename is durable
    pub fn save_catalog(&self, catalog: &Catalog) -> CoreResult<()> {
        let temp_path = self.path.join(CATALOG_TEMP);

        let data = catalog.encode()?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.catalog_path())?;
        self.sync_directory()?;
        Ok(())
    }

    /// Syncs the database directory so metadata updates are durable.
    ///
    /// NTFS journals metadata, so Windows skips the explicit fsync.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexDef;
    use crate::table::TableDef;
    use tabula_codec::{ColumnDef, DataType, Schema};
    use tabula_storage::BackendProvider;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");

        assert!(!db_path.exists());

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.exists());
        assert!(db_path.is_dir());
        assert!(dir.is_new_database());
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("nonexistent");

        let result = DatabaseDir::open(&db_path, false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked_db");

        let _dir1 = DatabaseDir::open(&db_path, true).unwrap();

        let result = DatabaseDir::open(&db_path, true);
        assert!(matches!(result, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen_db");

        {
            let _dir = DatabaseDir::open(&db_path, true).unwrap();
        }

        let _dir2 = DatabaseDir::open(&db_path, true).unwrap();
    }

    #[test]
    fn catalog_round_trip() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(&temp.path().join("catalog_db"), true).unwrap();

        assert!(dir.load_catalog().unwrap().is_none());

        let schema = Schema::new(vec![ColumnDef::new("card", DataType::Varchar)]).unwrap();
        let mut catalog = Catalog::new();
        catalog
            .add(TableDef::new("test1", schema).with_index(IndexDef::new("card", ["card"])))
            .unwrap();
        dir.save_catalog(&catalog).unwrap();

        assert!(!dir.is_new_database());
        assert!(!dir.path().join(CATALOG_TEMP).exists());
        assert_eq!(dir.load_catalog().unwrap(), Some(catalog));
    }

    #[test]
    fn provider_lives_under_tables_dir() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), true).unwrap();
        let provider = dir.provider();
        provider.create(1, 1).unwrap();
        assert!(provider
            .segment_path(1, 1)
            .starts_with(temp.path().join(TABLES_DIR)));
        assert_eq!(provider.list(1).unwrap(), vec![1]);
    }
}
