//! Database catalog: the persisted list of table definitions.
//!
//! ```text
//! | magic "TCAT" | version u16 | body len u32 | CBOR body | crc32 u32 |
//! ```
//!
//! The body is the CBOR encoding of [`Catalog`]. The checksum covers every
//! byte before it.

use crate::error::{CoreError, CoreResult};
use crate::table::TableDef;
use crate::types::TableId;
use serde::{Deserialize, Serialize};

/// Magic bytes for catalog files.
pub const CATALOG_MAGIC: [u8; 4] = *b"TCAT";

/// Current catalog version.
pub const CATALOG_VERSION: u16 = 1;

/// magic (4) + version (2) + body len (4)
const PREFIX_SIZE: usize = 10;
const CRC_SIZE: usize = 4;

/// Every table of a database, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Id the next created table receives.
    pub next_table_id: u32,
    /// Table ids and definitions.
    pub tables: Vec<(TableId, TableDef)>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_table_id: 1,
            tables: Vec::new(),
        }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<(TableId, &TableDef)> {
        self.tables
            .iter()
            .find(|(_, def)| def.name == name)
            .map(|(id, def)| (*id, def))
    }

    /// Registers `def` under a fresh id.
    ///
    /// Fails with [`CoreError::TableExists`] on a name clash.
    pub fn add(&mut self, def: TableDef) -> CoreResult<TableId> {
        if self.get(&def.name).is_some() {
            return Err(CoreError::TableExists { name: def.name });
        }
        let id = TableId::new(self.next_table_id);
        self.next_table_id += 1;
        self.tables.push((id, def));
        Ok(id)
    }

    /// Serializes the catalog.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let body = tabula_codec::to_cbor(self)?;
        let body_len = u32::try_from(body.len())
            .map_err(|_| CoreError::catalog("catalog larger than 4 GiB"))?;
        let mut buf = Vec::with_capacity(PREFIX_SIZE + body.len() + CRC_SIZE);
        buf.extend_from_slice(&CATALOG_MAGIC);
        buf.extend_from_slice(&CATALOG_VERSION.to_le_bytes());
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&body);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Parses and checks a serialized catalog.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < PREFIX_SIZE + CRC_SIZE || data[0..4] != CATALOG_MAGIC {
            return Err(CoreError::invalid_format("invalid catalog magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > CATALOG_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported catalog version: {version}"
            )));
        }
        let body_len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        let end = PREFIX_SIZE + body_len;
        if data.len() != end + CRC_SIZE {
            return Err(CoreError::invalid_format(format!(
                "catalog length {} does not match body length {body_len}",
                data.len()
            )));
        }
        let expected = u32::from_le_bytes([data[end], data[end + 1], data[end + 2], data[end + 3]]);
        let actual = crc32fast::hash(&data[..end]);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }
        let catalog: Self = tabula_codec::from_cbor(&data[PREFIX_SIZE..end])
            .map_err(|e| CoreError::catalog(e.to_string()))?;
        if let Some((id, _)) = catalog
            .tables
            .iter()
            .find(|(id, _)| id.as_u32() >= catalog.next_table_id)
        {
            return Err(CoreError::catalog(format!(
                "table {id} is not below next id {}",
                catalog.next_table_id
            )));
        }
        Ok(catalog)
    }
}
