//! Database facade and connection handles.

use crate::catalog::Catalog;
use crate::config::{Config, WriteOptions};
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::query::{ReadOption, ResultCursor, TraverseOption};
use crate::stats::{DatabaseStats, StatsSnapshot, TableStats};
use crate::table::{Table, TableDef};
use crate::types::{Pkey, SegmentId, TableId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tabula_codec::FieldMap;
use tabula_storage::{BackendProvider, MemoryProvider};
use tracing::{debug, info};

/// The main database handle.
///
/// `Database` owns the directory lock, the catalog and every open table.
/// All reads and writes go through a [`Connection`] obtained from
/// [`connect`](Self::connect).
///
/// # Opening a Database
///
/// ```rust,ignore
/// use tabula_core::{Database, WriteOptions};
/// use std::path::Path;
///
/// let db = Database::open(Path::new("my_database"))?;
/// let conn = db.connect();
/// conn.put("test1", &fields, &WriteOptions::default())?;
///
/// // Close gracefully
/// db.close()?;
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`:
///
/// ```rust,ignore
/// let db = Database::open_in_memory()?;
/// ```
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    /// Configuration.
    config: Config,
    /// Database directory (holds the lock). None for in-memory databases.
    dir: Option<DatabaseDir>,
    /// Where segment bytes live.
    provider: Arc<dyn BackendProvider>,
    /// Persisted table definitions.
    catalog: RwLock<Catalog>,
    /// Open tables by name.
    tables: RwLock<HashMap<String, Arc<Table>>>,
    /// Operation counters.
    stats: Arc<DatabaseStats>,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database from a directory path with default configuration.
    ///
    /// Creates the directory if it doesn't exist, takes the directory lock
    /// and reopens every table in the catalog.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use tabula_core::{Config, Database};
    ///
    /// let config = Config::default()
    ///     .create_if_missing(true)
    ///     .max_segment_records(4096);
    ///
    /// let db = Database::open_with_config(Path::new("my_database"), config)?;
    /// ```
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        if !config.create_if_missing && dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }

        if config.error_if_exists && !dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let catalog = match dir.load_catalog()? {
            Some(catalog) => catalog,
            None => {
                let catalog = Catalog::new();
                dir.save_catalog(&catalog)?;
                catalog
            }
        };
        let provider: Arc<dyn BackendProvider> = Arc::new(dir.provider());
        let db = Self::assemble(config, Some(dir), provider, catalog)?;
        info!(
            path = %path.display(),
            tables = db.inner.tables.read().len(),
            "opened database"
        );
        Ok(db)
    }

    /// Creates an in-memory database with default configuration.
    ///
    /// Nothing is persisted; all data is lost when the database is dropped.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Creates an in-memory database with custom configuration.
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        Self::assemble(config, None, Arc::new(MemoryProvider::new()), Catalog::new())
    }

    fn assemble(
        config: Config,
        dir: Option<DatabaseDir>,
        provider: Arc<dyn BackendProvider>,
        catalog: Catalog,
    ) -> CoreResult<Self> {
        let stats = Arc::new(DatabaseStats::new());
        let mut tables = HashMap::with_capacity(catalog.tables.len());
        for (id, def) in &catalog.tables {
            let table = Table::open(
                *id,
                def.clone(),
                Arc::clone(&provider),
                config.clone(),
                Arc::clone(&stats),
            )?;
            tables.insert(def.name.clone(), Arc::new(table));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                dir,
                provider,
                catalog: RwLock::new(catalog),
                tables: RwLock::new(tables),
                stats,
                is_open: RwLock::new(true),
            }),
        })
    }

    /// Returns a connection handle. Connections are cheap to clone and
    /// share the database.
    #[must_use]
    pub fn connect(&self) -> Connection {
        Connection {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Flushes and syncs every active segment and rewrites the catalog.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.inner.ensure_open()?;
        self.inner.sync_all()?;
        self.inner.stats.record_checkpoint();
        debug!("checkpoint complete");
        Ok(())
    }

    /// Closes the database. Later operations on any connection fail with
    /// [`CoreError::DatabaseClosed`].
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.inner.is_open.write();
        if !*is_open {
            return Ok(());
        }
        self.inner.sync_all()?;
        *is_open = false;
        info!(tables = self.inner.tables.read().len(), "closed database");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.inner.is_open.read()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Root directory, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("path", &self.path())
            .field("tables", &self.inner.tables.read().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Inner {
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    fn sync_all(&self) -> CoreResult<()> {
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        for table in tables {
            table.sync()?;
        }
        if let Some(ref dir) = self.dir {
            dir.save_catalog(&self.catalog.read())?;
        }
        Ok(())
    }
}

/// Explicit handle through which every table operation goes.
///
/// A connection is an `Arc` clone of the database state; dropping it
/// releases nothing else. After [`Database::close`] every method returns
/// [`CoreError::DatabaseClosed`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("is_open", &*self.inner.is_open.read())
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn table(&self, name: &str) -> CoreResult<Arc<Table>> {
        self.inner.ensure_open()?;
        self.inner
            .tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::TableNotFound {
                name: name.to_string(),
            })
    }

    fn track<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.inner.stats.record_error();
        }
        result
    }

    /// Creates a table.
    ///
    /// Fails with [`CoreError::TableExists`] if the name is taken. The
    /// catalog is persisted before this returns.
    pub fn create_table(&self, def: TableDef) -> CoreResult<TableId> {
        let result = self.try_create_table(def);
        self.track(result)
    }

    fn try_create_table(&self, def: TableDef) -> CoreResult<TableId> {
        self.inner.ensure_open()?;
        let mut catalog = self.inner.catalog.write();
        let mut next = catalog.clone();
        let id = next.add(def.clone())?;
        let table = Table::create(
            id,
            def,
            Arc::clone(&self.inner.provider),
            self.inner.config.clone(),
            Arc::clone(&self.inner.stats),
        )?;
        if let Some(ref dir) = self.inner.dir {
            dir.save_catalog(&next)?;
        }
        *catalog = next;
        self.inner
            .tables
            .write()
            .insert(table.name().to_string(), Arc::new(table));
        Ok(id)
    }

    /// Names of all tables in creation order.
    pub fn list_tables(&self) -> CoreResult<Vec<String>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .catalog
            .read()
            .tables
            .iter()
            .map(|(_, def)| def.name.clone())
            .collect())
    }

    /// Definition of one table.
    pub fn table_def(&self, table: &str) -> CoreResult<TableDef> {
        Ok(self.table(table)?.def().clone())
    }

    /// Inserts a row and returns its pkey.
    pub fn put(&self, table: &str, fields: &FieldMap, options: &WriteOptions) -> CoreResult<Pkey> {
        let result = self.table(table).and_then(|t| t.put(fields, options));
        self.track(result)
    }

    /// Runs one query.
    pub fn query(&self, table: &str, option: &ReadOption) -> CoreResult<ResultCursor> {
        let result = self.table(table).and_then(|t| t.query(option));
        self.track(result)
    }

    /// Runs each option as an independent query.
    ///
    /// The outer error covers the table lookup; each item carries its own
    /// planning error, if any.
    pub fn batch_query(
        &self,
        table: &str,
        options: &[ReadOption],
    ) -> CoreResult<Vec<CoreResult<ResultCursor>>> {
        let t = self.track(self.table(table))?;
        Ok(options
            .iter()
            .map(|option| self.track(t.query(option)))
            .collect())
    }

    /// Merges `new_values` into every current row matching `condition`.
    /// Returns the number of rows rewritten.
    pub fn update(
        &self,
        table: &str,
        condition: &FieldMap,
        new_values: &FieldMap,
        options: &WriteOptions,
    ) -> CoreResult<usize> {
        let result = self
            .table(table)
            .and_then(|t| t.update(condition, new_values, options));
        self.track(result)
    }

    /// Deletes every current row matching `condition`. Returns the number
    /// of rows deleted.
    pub fn delete(
        &self,
        table: &str,
        condition: &FieldMap,
        options: &WriteOptions,
    ) -> CoreResult<usize> {
        let result = self.table(table).and_then(|t| t.delete(condition, options));
        self.track(result)
    }

    /// Every live row of `table` in pkey order, up to the configured
    /// traversal limit.
    pub fn traverse(&self, table: &str) -> CoreResult<ResultCursor> {
        self.traverse_with(table, &TraverseOption::new())
    }

    /// Traversal with explicit paging.
    pub fn traverse_with(&self, table: &str, option: &TraverseOption) -> CoreResult<ResultCursor> {
        let result = self.table(table).map(|t| t.traverse(option));
        self.track(result)
    }

    /// Seals the active segment of `table`.
    pub fn seal(&self, table: &str) -> CoreResult<SegmentId> {
        let result = self.table(table).and_then(|t| t.seal());
        self.track(result)
    }

    /// Structural summary of `table`.
    pub fn stats(&self, table: &str) -> CoreResult<TableStats> {
        self.table(table).map(|t| t.stats())
    }

    /// Checks segment checksums and index integrity of `table`. Returns the
    /// number of records checked.
    pub fn verify(&self, table: &str) -> CoreResult<usize> {
        let result = self.table(table).and_then(|t| t.verify());
        self.track(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexDef;
    use tabula_codec::{field_map, ColumnDef, DataType, Schema, Value};
    use tempfile::tempdir;

    fn test1() -> TableDef {
        let schema = Schema::new(vec![
            ColumnDef::new("card", DataType::Varchar),
            ColumnDef::new("mcc", DataType::Varchar),
            ColumnDef::new("p_biz_date", DataType::BigInt),
        ])
        .unwrap();
        TableDef::new("test1", schema).with_index(IndexDef::new("card", ["card"]))
    }

    fn row(card: &str) -> FieldMap {
        field_map([
            ("card", Value::from(card)),
            ("mcc", Value::from("mcc0")),
            ("p_biz_date", Value::BigInt(3)),
        ])
    }

    #[test]
    fn open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.is_open());
        assert!(db.path().is_none());
    }

    #[test]
    fn create_table_twice_fails() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect();
        assert_eq!(conn.create_table(test1()).unwrap(), TableId::new(1));
        assert!(matches!(
            conn.create_table(test1()),
            Err(CoreError::TableExists { .. })
        ));
        assert_eq!(conn.list_tables().unwrap(), vec!["test1"]);
        assert_eq!(conn.table_def("test1").unwrap(), test1());
    }

    #[test]
    fn unknown_table() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect();
        assert!(matches!(
            conn.put("nope", &row("c"), &WriteOptions::default()),
            Err(CoreError::TableNotFound { .. })
        ));
        assert!(matches!(
            conn.traverse("nope"),
            Err(CoreError::TableNotFound { .. })
        ));
        assert_eq!(db.stats().errors, 2);
    }

    #[test]
    fn batch_query_reports_per_item_errors() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect();
        conn.create_table(test1()).unwrap();
        conn.put("test1", &row("card2"), &WriteOptions::default()).unwrap();

        let results = conn
            .batch_query(
                "test1",
                &[
                    ReadOption::new().bind("card", "card2"),
                    ReadOption::on_index("missing").bind("card", "card2"),
                ],
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CoreError::IndexNotFound { .. })));
    }

    #[test]
    fn close_database() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect();
        conn.create_table(test1()).unwrap();

        db.close().unwrap();
        assert!(!db.is_open());
        db.close().unwrap();

        let result = conn.query("test1", &ReadOption::new().bind("card", "c"));
        assert!(matches!(result, Err(CoreError::DatabaseClosed)));
        assert!(matches!(db.checkpoint(), Err(CoreError::DatabaseClosed)));
    }

    #[test]
    fn reopen_persists_tables_and_rows() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            let conn = db.connect();
            conn.create_table(test1()).unwrap();
            conn.put("test1", &row("card2"), &WriteOptions::relaxed()).unwrap();
            db.checkpoint().unwrap();
            assert_eq!(db.stats().checkpoints, 1);
        }
        let db = Database::open(temp.path()).unwrap();
        let conn = db.connect();
        assert_eq!(conn.list_tables().unwrap(), vec!["test1"]);
        let rows = conn
            .query("test1", &ReadOption::new().bind("card", "card2"))
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("mcc"), Some(&Value::from("mcc0")));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _db = Database::open(temp.path()).unwrap();
        assert!(matches!(
            Database::open(temp.path()),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn error_if_exists() {
        let temp = tempdir().unwrap();
        drop(Database::open(temp.path()).unwrap());
        let config = Config::default().error_if_exists(true);
        assert!(matches!(
            Database::open_with_config(temp.path(), config),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn missing_database_without_create() {
        let temp = tempdir().unwrap();
        let config = Config::default().create_if_missing(false);
        assert!(Database::open_with_config(&temp.path().join("absent"), config).is_err());
    }
}
