//! # Tabula Storage
//!
//! Append-only byte stores underneath Tabula's segment files.
//!
//! A backend knows nothing about records, pkeys, or trailers. It hands out
//! offsets for appended bytes and reads them back. Segment layout is owned
//! entirely by `tabula_core`.
//!
//! Two layers live here:
//!
//! - [`StorageBackend`]: a single append-only byte store (one segment file).
//!   [`InMemoryBackend`] and [`FileBackend`] implement it.
//! - [`BackendProvider`]: creates and enumerates the backends of a table's
//!   segments. [`MemoryProvider`] keeps them in a map, [`DirectoryProvider`]
//!   maps them to `<root>/<table>/<segment>.seg` files.
//!
//! [`FaultyProvider`] wraps any provider and fails appends, syncs,
//! truncates or creations on demand, for testing write-path failures.
//!
//! ## Example
//!
//! ```rust
//! use tabula_storage::{InMemoryBackend, StorageBackend};
//!
//! let backend = InMemoryBackend::new();
//! let offset = backend.append(b"row bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 9).unwrap(), b"row bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod fault;
mod file;
mod memory;
mod provider;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use fault::FaultyProvider;
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use provider::{BackendProvider, DirectoryProvider, MemoryProvider, SEGMENT_EXTENSION};
