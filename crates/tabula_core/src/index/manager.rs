//! Per-table index maintenance.

use crate::error::{CoreError, CoreResult};
use crate::index::btree::BTreeIndex;
use crate::index::traits::{Index, IndexDef, KeyRange};
use crate::types::Pkey;
use parking_lot::RwLock;
use std::collections::HashSet;
use tabula_codec::{encode_key, RowView, Schema, Value};

/// Owns every secondary index of one table.
///
/// All indexes sit behind a single lock so the entries of one write land
/// together: a reader sees either all of a record's index entries or none.
pub struct IndexManager {
    table: String,
    defs: Vec<IndexDef>,
    positions: Vec<Vec<usize>>,
    indexes: RwLock<Vec<BTreeIndex>>,
}

impl IndexManager {
    /// Validates `defs` against `schema` and creates empty indexes.
    pub fn new(table: &str, schema: &Schema, defs: &[IndexDef]) -> CoreResult<Self> {
        let mut names = HashSet::new();
        let mut positions = Vec::with_capacity(defs.len());
        for def in defs {
            if def.name.is_empty() {
                return Err(CoreError::invalid_operation(format!(
                    "table `{table}`: index name is empty"
                )));
            }
            if !names.insert(def.name.as_str()) {
                return Err(CoreError::invalid_operation(format!(
                    "table `{table}`: duplicate index `{}`",
                    def.name
                )));
            }
            if def.fields.is_empty() {
                return Err(CoreError::invalid_operation(format!(
                    "table `{table}`: index `{}` has no fields",
                    def.name
                )));
            }
            let mut seen = HashSet::new();
            let mut cols = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                if !seen.insert(field.as_str()) {
                    return Err(CoreError::invalid_operation(format!(
                        "table `{table}`: index `{}` repeats field `{field}`",
                        def.name
                    )));
                }
                let pos = schema.position(field).ok_or_else(|| CoreError::UnknownField {
                    table: table.to_string(),
                    field: field.clone(),
                })?;
                cols.push(pos);
            }
            positions.push(cols);
        }

        Ok(Self {
            table: table.to_string(),
            defs: defs.to_vec(),
            positions,
            indexes: RwLock::new(defs.iter().cloned().map(BTreeIndex::new).collect()),
        })
    }

    /// Index definitions in declaration order.
    #[must_use]
    pub fn defs(&self) -> &[IndexDef] {
        &self.defs
    }

    /// Position of the index called `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|d| d.name == name)
    }

    fn require(&self, name: &str) -> CoreResult<usize> {
        self.find(name).ok_or_else(|| CoreError::IndexNotFound {
            table: self.table.clone(),
            index: name.to_string(),
        })
    }

    fn check_arity(&self, idx: usize, values: &[Value], is_prefix: bool) -> CoreResult<()> {
        let def = &self.defs[idx];
        let ok = if is_prefix {
            values.len() <= def.fields.len()
        } else {
            values.len() == def.fields.len()
        };
        if ok {
            Ok(())
        } else {
            Err(CoreError::InvalidReadOption {
                table: self.table.clone(),
                index: def.name.clone(),
                message: format!(
                    "{} values for {} indexed fields",
                    values.len(),
                    def.fields.len()
                ),
            })
        }
    }

    /// Adds an entry under the key formed by `key_values`.
    pub fn insert(&self, index: &str, key_values: &[Value], pkey: Pkey) -> CoreResult<()> {
        let idx = self.require(index)?;
        self.check_arity(idx, key_values, false)?;
        self.indexes.write()[idx].insert(encode_key(key_values), pkey);
        Ok(())
    }

    /// Pkeys whose key equals `key_values`, or starts with them when
    /// `is_prefix` is set.
    pub fn lookup(&self, index: &str, key_values: &[Value], is_prefix: bool) -> CoreResult<Vec<Pkey>> {
        let idx = self.require(index)?;
        self.check_arity(idx, key_values, is_prefix)?;
        let key = encode_key(key_values);
        let indexes = self.indexes.read();
        Ok(if is_prefix {
            indexes[idx].scan(&KeyRange::prefix(key))
        } else {
            indexes[idx].lookup(&key)
        })
    }

    /// Removes one entry, returning whether it existed.
    pub fn remove(&self, index: &str, key_values: &[Value], pkey: Pkey) -> CoreResult<bool> {
        let idx = self.require(index)?;
        self.check_arity(idx, key_values, false)?;
        Ok(self.indexes.write()[idx].remove(&encode_key(key_values), pkey))
    }

    /// Builds the key of every index for one encoded row, reading only the
    /// indexed columns.
    pub fn keys_for_row(&self, schema: &Schema, row: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        let view = RowView::new(schema, row)?;
        self.positions
            .iter()
            .map(|cols| -> CoreResult<Vec<u8>> {
                let values = cols
                    .iter()
                    .map(|&pos| view.get(pos))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(encode_key(&values))
            })
            .collect()
    }

    /// Inserts one key per index for `pkey` in a single critical section.
    pub fn insert_row(&self, keys: Vec<Vec<u8>>, pkey: Pkey) {
        let mut indexes = self.indexes.write();
        for (index, key) in indexes.iter_mut().zip(keys) {
            index.insert(key, pkey);
        }
    }

    /// Pkeys under exactly `key` in index `idx`, newest first.
    #[must_use]
    pub fn lookup_key(&self, idx: usize, key: &[u8]) -> Vec<Pkey> {
        self.indexes.read()[idx].lookup(key)
    }

    /// Pkeys in `range` of index `idx`.
    #[must_use]
    pub fn scan(&self, idx: usize, range: &KeyRange) -> Vec<Pkey> {
        self.indexes.read()[idx].scan(range)
    }

    /// Total entries across all indexes.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.indexes.read().iter().map(Index::len).sum()
    }

    /// Reports every entry whose pkey `exists` rejects, as
    /// `(index name, pkey)`.
    pub fn dangling<F>(&self, exists: F) -> Vec<(String, Pkey)>
    where
        F: Fn(Pkey) -> bool,
    {
        let indexes = self.indexes.read();
        let mut found = Vec::new();
        for index in indexes.iter() {
            for (_, pkey) in index.entries() {
                if !exists(pkey) {
                    found.push((index.def().name.clone(), pkey));
                }
            }
        }
        found
    }
}
