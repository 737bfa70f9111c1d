//! Tables and the write coordinator.
//!
//! A [`Table`] ties one schema to its segments and indexes. Writes are
//! serialized by a per-table writer lock and follow one sequence:
//!
//! 1. encode and validate every new row (nothing is appended on failure)
//! 2. append the records to the active segment
//! 3. sync the segment if the write asked for strong consistency
//! 4. insert index entries and point old versions at their replacements
//! 5. publish the last pkey, which makes the whole batch visible at once
//!
//! Readers never take the writer lock. They capture the watermark and the
//! segment list and filter everything newer.

use crate::config::{Config, Consistency, WriteOptions};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDef, IndexManager};
use crate::query::{plan, ReadOption, ResultCursor, ScanPlan, TraverseOption};
use crate::segment::{SegmentManager, SegmentRecord, SlotState};
use crate::stats::{DatabaseStats, TableStats};
use crate::types::{Pkey, SegmentId, TableId};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use tabula_codec::{decode, encode, FieldMap, Schema};
use tabula_storage::BackendProvider;
use tracing::{debug, info, warn};

/// Declaration of a table: name, schema and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name, unique within the database.
    pub name: String,
    /// Column layout.
    pub schema: Schema,
    /// Secondary indexes in declaration order.
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// A table without indexes.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            indexes: Vec::new(),
        }
    }

    /// Adds an index.
    #[must_use]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }
}

/// One record version waiting to be written.
struct Staged {
    /// Lineage of the row; `None` starts a new lineage at the record's pkey.
    lineage: Option<Pkey>,
    /// Version this record replaces.
    supersedes: Option<Pkey>,
    /// Encoded row, `None` for a tombstone.
    row: Option<Vec<u8>>,
    /// One key per index; empty for a tombstone.
    keys: Vec<Vec<u8>>,
}

/// A table with its segments and indexes.
pub struct Table {
    id: TableId,
    def: TableDef,
    schema: Arc<Schema>,
    segments: SegmentManager,
    indexes: IndexManager,
    writer: Mutex<()>,
    config: Config,
    stats: Arc<DatabaseStats>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("name", &self.def.name)
            .field("watermark", &self.segments.watermark())
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Creates a new, empty table.
    pub(crate) fn create(
        id: TableId,
        def: TableDef,
        provider: Arc<dyn BackendProvider>,
        config: Config,
        stats: Arc<DatabaseStats>,
    ) -> CoreResult<Self> {
        if def.name.is_empty() {
            return Err(CoreError::invalid_operation("table name is empty"));
        }
        let indexes = IndexManager::new(&def.name, &def.schema, &def.indexes)?;
        let segments = SegmentManager::create(id, provider)?;
        info!(table = %def.name, id = %id, indexes = def.indexes.len(), "created table");
        Ok(Self {
            id,
            schema: Arc::new(def.schema.clone()),
            def,
            segments,
            indexes,
            writer: Mutex::new(()),
            config,
            stats,
        })
    }

    /// Opens an existing table, rebuilding version chains and indexes from
    /// its segments.
    pub(crate) fn open(
        id: TableId,
        def: TableDef,
        provider: Arc<dyn BackendProvider>,
        config: Config,
        stats: Arc<DatabaseStats>,
    ) -> CoreResult<Self> {
        let indexes = IndexManager::new(&def.name, &def.schema, &def.indexes)?;
        let segments = SegmentManager::open(id, provider)?;
        let table = Self {
            id,
            schema: Arc::new(def.schema.clone()),
            def,
            segments,
            indexes,
            writer: Mutex::new(()),
            config,
            stats,
        };
        let records = table.rebuild()?;
        info!(
            table = %table.def.name,
            id = %id,
            records,
            watermark = %table.segments.watermark(),
            "opened table"
        );
        Ok(table)
    }

    fn rebuild(&self) -> CoreResult<usize> {
        let mut latest: HashMap<Pkey, Pkey> = HashMap::new();
        let mut records = 0;
        for segment in self.segments.snapshot() {
            for record in segment.scan(..) {
                let record = record?;
                records += 1;
                if let Some(prev) = latest.insert(record.lineage, record.pkey) {
                    self.segments.mark_superseded(prev, record.pkey)?;
                }
                if !record.is_tombstone() {
                    let keys = self
                        .indexes
                        .keys_for_row(&self.schema, &record.payload)
                        .map_err(|e| self.reject(e))?;
                    self.indexes.insert_row(keys, record.pkey);
                }
            }
        }
        Ok(records)
    }

    /// Table id.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Table declaration.
    #[must_use]
    pub fn def(&self) -> &TableDef {
        &self.def
    }

    /// Column layout.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Highest pkey visible to readers.
    #[must_use]
    pub fn watermark(&self) -> Pkey {
        self.segments.watermark()
    }

    fn reject(&self, err: CoreError) -> CoreError {
        match err {
            CoreError::Codec(e) => CoreError::from_codec(&self.def.name, e),
            other => other,
        }
    }

    fn lock_writer(&self, options: &WriteOptions) -> CoreResult<MutexGuard<'_, ()>> {
        match options.timeout {
            None => Ok(self.writer.lock()),
            Some(timeout) => self
                .writer
                .try_lock_for(timeout)
                .ok_or_else(|| CoreError::Timeout {
                    table: self.def.name.clone(),
                    millis: timeout.as_millis(),
                }),
        }
    }

    fn slot_state(&self, pkey: Pkey) -> Option<SlotState> {
        self.segments.locate(pkey)?.slot_state(pkey)
    }

    /// Inserts a new row and returns its pkey.
    pub fn put(&self, fields: &FieldMap, options: &WriteOptions) -> CoreResult<Pkey> {
        let name = self.def.name.as_str();
        let record = self
            .schema
            .record_from_fields(fields)
            .map_err(|e| CoreError::from_codec(name, e))?;
        let row = encode(&record, &self.schema).map_err(|e| CoreError::from_codec(name, e))?;
        let keys = self
            .indexes
            .keys_for_row(&self.schema, &row)
            .map_err(|e| self.reject(e))?;
        let bytes = row.len() as u64;

        let _writer = self.lock_writer(options)?;
        let staged = vec![Staged {
            lineage: None,
            supersedes: None,
            row: Some(row),
            keys,
        }];
        self.check_unique(&staged)?;
        let pkey = self.write_batch(staged, options)?;
        self.maybe_seal();

        self.stats.record_put(bytes);
        debug!(table = name, pkey = %pkey, bytes, "put");
        Ok(pkey)
    }

    /// Rewrites every current row matching `condition` with `new_values`
    /// merged over its old fields. Returns the number of rows rewritten.
    ///
    /// Every merged row is validated before the first append; on any
    /// validation failure nothing is written.
    pub fn update(
        &self,
        condition: &FieldMap,
        new_values: &FieldMap,
        options: &WriteOptions,
    ) -> CoreResult<usize> {
        let name = self.def.name.as_str();
        if new_values.is_empty() {
            return Ok(0);
        }
        let assignments = new_values
            .iter()
            .map(|(field, value)| self.schema.coerce_field(field, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::from_codec(name, e))?;
        let plan = plan(
            name,
            &self.schema,
            &self.indexes,
            &ReadOption::from_condition(condition),
        )?;

        let _writer = self.lock_writer(options)?;
        let matches = self.current_matches(&plan);
        let mut staged = Vec::with_capacity(matches.len());
        for (pkey, state) in &matches {
            let mut record = self.read_record(*pkey)?;
            for (pos, value) in &assignments {
                record.set(*pos, value.clone());
            }
            let row = encode(&record, &self.schema).map_err(|e| CoreError::from_codec(name, e))?;
            let keys = self
                .indexes
                .keys_for_row(&self.schema, &row)
                .map_err(|e| self.reject(e))?;
            staged.push(Staged {
                lineage: Some(state.lineage),
                supersedes: Some(*pkey),
                row: Some(row),
                keys,
            });
        }
        if staged.is_empty() {
            debug!(table = name, index = %plan.index_name, "update matched nothing");
            return Ok(0);
        }
        self.check_unique(&staged)?;
        let count = staged.len();
        let last = self.write_batch(staged, options)?;
        self.maybe_seal();

        self.stats.record_update(count as u64);
        debug!(table = name, index = %plan.index_name, rows = count, last = %last, "update");
        Ok(count)
    }

    /// Tombstones every current row matching `condition`. Returns the number
    /// of rows deleted.
    pub fn delete(&self, condition: &FieldMap, options: &WriteOptions) -> CoreResult<usize> {
        let name = self.def.name.as_str();
        let plan = plan(
            name,
            &self.schema,
            &self.indexes,
            &ReadOption::from_condition(condition),
        )?;

        let _writer = self.lock_writer(options)?;
        let staged: Vec<Staged> = self
            .current_matches(&plan)
            .into_iter()
            .map(|(pkey, state)| Staged {
                lineage: Some(state.lineage),
                supersedes: Some(pkey),
                row: None,
                keys: Vec::new(),
            })
            .collect();
        if staged.is_empty() {
            return Ok(0);
        }
        let count = staged.len();
        self.write_batch(staged, options)?;
        self.maybe_seal();

        self.stats.record_delete(count as u64);
        debug!(table = name, index = %plan.index_name, rows = count, "delete");
        Ok(count)
    }

    /// Runs one query.
    pub fn query(&self, option: &ReadOption) -> CoreResult<ResultCursor> {
        let plan = plan(&self.def.name, &self.schema, &self.indexes, option)?;
        let watermark = self.segments.watermark();
        let segments = self.segments.snapshot();
        let candidates = self.candidates(&plan);
        self.stats.record_query();
        debug!(
            table = %self.def.name,
            index = %plan.index_name,
            candidates = candidates.len(),
            watermark = %watermark,
            "query"
        );
        Ok(ResultCursor::new(
            &self.def.name,
            Arc::clone(&self.schema),
            segments,
            watermark,
            candidates,
            option.include_history,
            None,
        ))
    }

    /// Every live row in pkey order, sealed segments first.
    pub fn traverse(&self, option: &TraverseOption) -> ResultCursor {
        let watermark = self.segments.watermark();
        let segments = self.segments.snapshot();
        let lower = option.start_after.map_or(Bound::Unbounded, Bound::Excluded);
        let candidates: Vec<Pkey> = segments
            .iter()
            .flat_map(|s| s.pkeys((lower, Bound::Included(watermark))))
            .collect();
        let limit = option.limit.or(self.config.max_traverse_count);
        self.stats.record_traversal();
        debug!(
            table = %self.def.name,
            after = ?option.start_after,
            limit = ?limit,
            "traverse"
        );
        ResultCursor::new(
            &self.def.name,
            Arc::clone(&self.schema),
            segments,
            watermark,
            candidates,
            false,
            limit,
        )
    }

    /// Seals the active segment, even when it is empty.
    pub fn seal(&self) -> CoreResult<SegmentId> {
        let _writer = self.writer.lock();
        let id = self.segments.seal_active(self.config.sync_on_seal)?;
        self.stats.record_seal();
        Ok(id)
    }

    /// Flushes and syncs the active segment.
    pub fn sync(&self) -> CoreResult<()> {
        let _writer = self.writer.lock();
        self.segments.sync_active()
    }

    /// Structural summary at the current watermark.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        let watermark = self.segments.watermark();
        let segments = self.segments.snapshot();
        let mut stats = TableStats {
            table: self.def.name.clone(),
            index_entries: self.indexes.entry_count() as u64,
            watermark: watermark.as_u64(),
            ..TableStats::default()
        };
        for segment in &segments {
            stats.total_records += segment.len() as u64;
            stats.tombstones += segment.tombstone_count() as u64;
            if segment.is_sealed() {
                stats.sealed_segments += 1;
            } else {
                stats.active_records += segment.len() as u64;
            }
            stats.live_records += segment
                .pkeys(..=watermark)
                .into_iter()
                .filter(|&p| {
                    segment
                        .slot_state(p)
                        .is_some_and(|s| s.is_visible(watermark, false))
                })
                .count() as u64;
        }
        stats
    }

    /// Re-reads every record (checking checksums) and checks that every
    /// index entry resolves to a stored record. Returns the number of
    /// records checked.
    ///
    /// Fails with [`CoreError::Integrity`] on dangling index entries.
    /// Nothing is repaired.
    pub fn verify(&self) -> CoreResult<usize> {
        let mut checked = 0;
        for segment in self.segments.snapshot() {
            for record in segment.scan(..) {
                record?;
                checked += 1;
            }
        }
        let dangling = self.indexes.dangling(|p| self.slot_state(p).is_some());
        if let Some((index, pkey)) = dangling.first() {
            for (index, pkey) in &dangling {
                warn!(table = %self.def.name, index = %index, pkey = %pkey, "dangling index entry");
            }
            return Err(CoreError::Integrity {
                table: self.def.name.clone(),
                message: format!(
                    "{} dangling index entries, first in `{index}` for {pkey}",
                    dangling.len()
                ),
            });
        }
        debug!(table = %self.def.name, records = checked, "verified table");
        Ok(checked)
    }

    fn candidates(&self, plan: &ScanPlan) -> Vec<Pkey> {
        if plan.point {
            self.indexes.lookup_key(plan.index, &plan.range.prefix)
        } else {
            self.indexes.scan(plan.index, &plan.range)
        }
    }

    /// Current versions matching `plan`. Only called under the writer lock,
    /// where every written record is already published.
    fn current_matches(&self, plan: &ScanPlan) -> Vec<(Pkey, SlotState)> {
        let watermark = self.segments.watermark();
        self.candidates(plan)
            .into_iter()
            .filter(|&p| p <= watermark)
            .filter_map(|p| Some((p, self.slot_state(p)?)))
            .filter(|(_, s)| s.is_current())
            .collect()
    }

    fn read_record(&self, pkey: Pkey) -> CoreResult<tabula_codec::Record> {
        let record = self
            .segments
            .locate(pkey)
            .map(|s| s.get(pkey))
            .transpose()?
            .flatten()
            .ok_or_else(|| CoreError::Integrity {
                table: self.def.name.clone(),
                message: format!("index entry refers to missing record {pkey}"),
            })?;
        decode(&record.payload, &self.schema).map_err(|e| CoreError::from_codec(&self.def.name, e))
    }

    /// Rejects rows that would give a unique index a second current holder,
    /// either against stored rows or within the batch itself. Rows whose
    /// lineage the batch replaces do not count.
    fn check_unique(&self, staged: &[Staged]) -> CoreResult<()> {
        let replaced: HashSet<Pkey> = staged.iter().filter_map(|s| s.lineage).collect();
        for (idx, def) in self.indexes.defs().iter().enumerate() {
            if !def.is_unique() {
                continue;
            }
            let mut claimed = HashSet::new();
            for s in staged.iter().filter(|s| s.row.is_some()) {
                let key = s.keys[idx].as_slice();
                let taken = !claimed.insert(key)
                    || self.indexes.lookup_key(idx, key).into_iter().any(|p| {
                        self.slot_state(p)
                            .is_some_and(|st| st.is_current() && !replaced.contains(&st.lineage))
                    });
                if taken {
                    return Err(CoreError::DuplicateKey {
                        table: self.def.name.clone(),
                        index: def.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Appends `staged`, then indexes and publishes it as one batch.
    /// Returns the last pkey written.
    ///
    /// If an append or the strong sync fails, the records already appended
    /// are rolled back before the error is returned, so a later publish
    /// cannot expose half a batch.
    fn write_batch(&self, staged: Vec<Staged>, options: &WriteOptions) -> CoreResult<Pkey> {
        let mark = self.segments.begin_batch();
        let written = match self.append_batch(staged, options) {
            Ok(written) => written,
            Err(e) => {
                warn!(table = %self.def.name, error = %e, "write failed; rolling back batch");
                self.segments.rollback(mark);
                return Err(e);
            }
        };

        let mut last = Pkey::NONE;
        for (pkey, s) in written {
            if let Some(prev) = s.supersedes {
                self.segments.mark_superseded(prev, pkey)?;
            }
            if s.row.is_some() {
                self.indexes.insert_row(s.keys, pkey);
            }
            last = pkey;
        }
        self.segments.publish(last);
        Ok(last)
    }

    fn append_batch(
        &self,
        staged: Vec<Staged>,
        options: &WriteOptions,
    ) -> CoreResult<Vec<(Pkey, Staged)>> {
        let mut written = Vec::with_capacity(staged.len());
        for s in staged {
            let pkey = self.segments.allocate();
            let lineage = s.lineage.unwrap_or(pkey);
            let record = match &s.row {
                Some(row) => SegmentRecord::put(pkey, lineage, row.clone()),
                None => SegmentRecord::tombstone(pkey, lineage),
            };
            self.segments.append(&record)?;
            written.push((pkey, s));
        }
        if options.consistency == Consistency::Strong {
            self.segments.sync_active()?;
        }
        Ok(written)
    }

    fn maybe_seal(&self) {
        let active = self.segments.active();
        if (active.len() as u64) < self.config.max_segment_records
            && active.data_size() < self.config.max_segment_bytes
        {
            return;
        }
        match self.segments.seal_active(self.config.sync_on_seal) {
            Ok(_) => self.stats.record_seal(),
            Err(e) => warn!(table = %self.def.name, error = %e, "automatic seal failed"),
        }
    }
}
