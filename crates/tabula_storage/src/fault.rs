//! Fault injection for exercising failure paths.
//!
//! [`FaultyProvider`] wraps another provider and hands out backends that
//! consult a shared switchboard before every append, sync, truncate and
//! segment creation. Tests flip the switches to simulate a full disk or a
//! failing device at an exact point of a write path.
//!
//! ```rust
//! use std::sync::Arc;
//! use tabula_storage::{BackendProvider, FaultyProvider, MemoryProvider, StorageBackend};
//!
//! let provider = FaultyProvider::new(Arc::new(MemoryProvider::new()));
//! let backend = provider.create(1, 1).unwrap();
//! provider.fail_appends_after(1);
//! assert!(backend.append(b"ok").is_ok());
//! assert!(backend.append(b"lost").is_err());
//! provider.heal();
//! assert!(backend.append(b"ok again").is_ok());
//! ```

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::provider::BackendProvider;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const UNLIMITED: usize = usize::MAX;

#[derive(Debug)]
struct Switchboard {
    appends_left: AtomicUsize,
    fail_syncs: AtomicBool,
    fail_truncates: AtomicBool,
    fail_creates: AtomicBool,
    injected: AtomicUsize,
}

impl Switchboard {
    fn new() -> Self {
        Self {
            appends_left: AtomicUsize::new(UNLIMITED),
            fail_syncs: AtomicBool::new(false),
            fail_truncates: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
        }
    }

    fn fault(&self, what: &str) -> StorageError {
        self.injected.fetch_add(1, Ordering::Relaxed);
        StorageError::Io(io::Error::other(format!("injected {what} fault: disk full")))
    }

    fn check_append(&self) -> StorageResult<()> {
        let granted = self
            .appends_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                UNLIMITED => Some(n),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();
        if granted {
            Ok(())
        } else {
            Err(self.fault("append"))
        }
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> StorageResult<()> {
        if flag.load(Ordering::Acquire) {
            Err(self.fault(what))
        } else {
            Ok(())
        }
    }
}

/// Provider whose backends fail on demand.
pub struct FaultyProvider {
    inner: Arc<dyn BackendProvider>,
    switches: Arc<Switchboard>,
}

impl std::fmt::Debug for FaultyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyProvider")
            .field("switches", &self.switches)
            .finish_non_exhaustive()
    }
}

impl FaultyProvider {
    /// Wraps `inner`. No faults are armed.
    pub fn new(inner: Arc<dyn BackendProvider>) -> Self {
        Self {
            inner,
            switches: Arc::new(Switchboard::new()),
        }
    }

    /// Lets `n` more appends through, then fails every append.
    pub fn fail_appends_after(&self, n: usize) {
        self.switches.appends_left.store(n, Ordering::Release);
    }

    /// Fails every `sync` while set.
    pub fn fail_syncs(&self, fail: bool) {
        self.switches.fail_syncs.store(fail, Ordering::Release);
    }

    /// Fails every `truncate` while set.
    pub fn fail_truncates(&self, fail: bool) {
        self.switches.fail_truncates.store(fail, Ordering::Release);
    }

    /// Fails every segment creation while set.
    pub fn fail_creates(&self, fail: bool) {
        self.switches.fail_creates.store(fail, Ordering::Release);
    }

    /// Disarms every fault.
    pub fn heal(&self) {
        self.fail_appends_after(UNLIMITED);
        self.fail_syncs(false);
        self.fail_truncates(false);
        self.fail_creates(false);
    }

    /// Number of faults raised so far.
    #[must_use]
    pub fn injected(&self) -> usize {
        self.switches.injected.load(Ordering::Relaxed)
    }

    fn wrap(&self, backend: Arc<dyn StorageBackend>) -> Arc<dyn StorageBackend> {
        Arc::new(FaultyBackend {
            inner: backend,
            switches: Arc::clone(&self.switches),
        })
    }
}

impl BackendProvider for FaultyProvider {
    fn create(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        self.switches.check(&self.switches.fail_creates, "create")?;
        self.inner.create(table, segment).map(|b| self.wrap(b))
    }

    fn open(&self, table: u32, segment: u64) -> StorageResult<Arc<dyn StorageBackend>> {
        self.inner.open(table, segment).map(|b| self.wrap(b))
    }

    fn list(&self, table: u32) -> StorageResult<Vec<u64>> {
        self.inner.list(table)
    }

    fn remove(&self, table: u32, segment: u64) -> StorageResult<()> {
        self.inner.remove(table, segment)
    }

    fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }
}

struct FaultyBackend {
    inner: Arc<dyn StorageBackend>,
    switches: Arc<Switchboard>,
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        self.switches.check_append()?;
        self.inner.append(data)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&self) -> StorageResult<()> {
        self.switches.check(&self.switches.fail_syncs, "sync")?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.switches.check(&self.switches.fail_truncates, "truncate")?;
        self.inner.truncate(new_size)
    }
}
