//! CLI command implementations.

pub mod inspect;
pub mod seal;
pub mod traverse;
pub mod verify;

use std::path::Path;
use tabula_core::{Config, CoreResult, Database};

/// Opens an existing database; never creates one.
pub fn open_existing(path: &Path) -> CoreResult<Database> {
    Database::open_with_config(path, Config::default().create_if_missing(false))
}
