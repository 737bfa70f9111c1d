//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A [`StorageBackend`] over one OS file.
///
/// The logical size is tracked separately from the file handle so readers
/// can bounds-check without taking the file lock. The size is published with
/// `Release` only after the bytes are written, so a reader that observes a
/// size can always read up to it.
///
/// # Example
///
/// ```no_run
/// use tabula_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("0000000000000001.seg")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: AtomicU64,
}

impl FileBackend {
    /// Opens the file at `path`, creating it if absent.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size: AtomicU64::new(size),
        })
    }

    /// Like [`FileBackend::open`], creating missing parent directories first.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.size.load(Ordering::Acquire);
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.lock();
        let offset = self.size.load(Ordering::Acquire);
        if data.is_empty() {
            return Ok(offset);
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.size
            .store(offset + data.len() as u64, Ordering::Release);
        Ok(offset)
    }

    fn flush(&self) -> StorageResult<()> {
        self.file.lock().flush()?;
        Ok(())
    }

    fn sync(&self) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size.load(Ordering::Acquire))
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let file = self.file.lock();
        let size = self.size.load(Ordering::Acquire);
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size.store(new_size, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("a.seg")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_from(6).unwrap(), b"world");
    }

    #[test]
    fn reopen_sees_synced_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.seg");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.append(b"durable").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 7);
        assert_eq!(backend.read_at(0, 7).unwrap(), b"durable");
    }

    #[test]
    fn truncate_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.seg");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.append(b"keep|drop").unwrap();
            backend.truncate(4).unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_from(0).unwrap(), b"keep");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("d.seg")).unwrap();
        backend.append(b"xy").unwrap();
        assert!(matches!(
            backend.read_at(1, 4),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t1").join("0001.seg");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }
}
