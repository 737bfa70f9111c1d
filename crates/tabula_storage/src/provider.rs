//! Per-segment backend allocation.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of segment files.
pub const SEGMENT_EXTENSION: &str = "seg";

/// Creates, reopens and lists the backends that hold a table's segments.
///
/// Segment ids are allocated by the caller; the provider only maps
/// `(table, segment)` to a byte store.
pub trait BackendProvider: Send + Sync {
    /// Creates the backend for a new segment.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::AlreadyExists`] if the segment exists.
    fn create(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>>;

    /// Reopens the backend of an existing segment.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::NotFound`] if the segment does not exist.
    fn open(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>>;

    /// Lists the segment ids of `table` in ascending order.
    fn list(&self, table: u32) -> StorageResult<Vec<u64>>;

    /// Deletes the backend of a segment that was never made visible.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::NotFound`] if the segment does not exist.
    fn remove(&self, table: u32, segment: u64) -> StorageResult<()>;

    /// Whether data outlives the process.
    fn is_persistent(&self) -> bool;
}

/// Keeps every segment in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    segments: Mutex<BTreeMap<(u32, u64), Arc<InMemoryBackend>>>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendProvider for MemoryProvider {
    fn create(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        let mut segments = self.segments.lock();
        if segments.contains_key(&(table, segment)) {
            return Err(StorageError::AlreadyExists { table, segment });
        }
        let backend = Arc::new(InMemoryBackend::new());
        segments.insert((table, segment), Arc::clone(&backend));
        Ok(backend)
    }

    fn open(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        self.segments
            .lock()
            .get(&(table, segment))
            .map(|b| Arc::clone(b) as Arc<dyn StorageBackend>)
            .ok_or(StorageError::NotFound { table, segment })
    }

    fn list(&self, table: u32) -> StorageResult<Vec<u64>> {
        Ok(self
            .segments
            .lock()
            .range((table, 0)..=(table, u64::MAX))
            .map(|(&(_, segment), _)| segment)
            .collect())
    }

    fn remove(&self, table: u32, segment: u64) -> StorageResult<()> {
        self.segments
            .lock()
            .remove(&(table, segment))
            .map(|_| ())
            .ok_or(StorageError::NotFound { table, segment })
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// Stores segments as `<root>/<table>/<segment:016x>.seg`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Creates a provider rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of all table subdirectories.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one segment file.
    #[must_use]
    pub fn segment_path(&self, table: u32, segment: u64) -> PathBuf {
        self.root
            .join(table.to_string())
            .join(format!("{segment:016x}.{SEGMENT_EXTENSION}"))
    }
}

impl BackendProvider for DirectoryProvider {
    fn create(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        let path = self.segment_path(table, segment);
        if path.exists() {
            return Err(StorageError::AlreadyExists { table, segment });
        }
        Ok(Arc::new(FileBackend::open_with_create_dirs(&path)?))
    }

    fn open(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        let path = self.segment_path(table, segment);
        if !path.exists() {
            return Err(StorageError::NotFound { table, segment });
        }
        Ok(Arc::new(FileBackend::open(&path)?))
    }

    fn list(&self, table: u32) -> StorageResult<Vec<u64>> {
        let dir = self.root.join(table.to_string());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(id) = u64::from_str_radix(stem, 16) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn remove(&self, table: u32, segment: u64) -> StorageResult<()> {
        let path = self.segment_path(table, segment);
        if !path.exists() {
            return Err(StorageError::NotFound { table, segment });
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
