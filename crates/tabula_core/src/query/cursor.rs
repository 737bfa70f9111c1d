//! Lazy result cursors.

use crate::error::{CoreError, CoreResult};
use crate::segment::{locate, Segment, SlotState};
use crate::types::Pkey;
use std::collections::VecDeque;
use std::sync::Arc;
use tabula_codec::{decode, FieldMap, Schema, Value};

/// One row returned by a query or traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pkey: Pkey,
    fields: Vec<(String, Value)>,
}

impl Row {
    /// Pkey of the record version this row was read from.
    #[must_use]
    pub fn pkey(&self) -> Pkey {
        self.pkey
    }

    /// Fields in schema order.
    #[must_use]
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Value of the field called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The row as a name-keyed map.
    #[must_use]
    pub fn to_field_map(&self) -> FieldMap {
        self.fields.iter().cloned().collect()
    }

    /// Consumes the row, returning its fields in schema order.
    #[must_use]
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

/// A lazy, finite, forward-only sequence of rows.
///
/// The cursor captures the table's segment list and visible watermark when
/// it is created and never takes a table lock afterwards. Record bodies
/// are read and decoded one at a time as the cursor advances. Dropping a
/// cursor part-way has no side effects.
#[derive(Debug)]
pub struct ResultCursor {
    table: String,
    schema: Arc<Schema>,
    segments: Vec<Arc<Segment>>,
    watermark: Pkey,
    include_history: bool,
    pending: VecDeque<Pkey>,
    filtered: bool,
    limit: Option<usize>,
    yielded: usize,
    last: Option<Pkey>,
}

impl ResultCursor {
    pub(crate) fn new(
        table: &str,
        schema: Arc<Schema>,
        segments: Vec<Arc<Segment>>,
        watermark: Pkey,
        candidates: Vec<Pkey>,
        include_history: bool,
        limit: Option<usize>,
    ) -> Self {
        Self {
            table: table.to_string(),
            schema,
            segments,
            watermark,
            include_history,
            pending: candidates.into(),
            filtered: false,
            limit,
            yielded: 0,
            last: None,
        }
    }

    /// Table the cursor reads from.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Pkey of the last row returned, for resuming a traversal.
    #[must_use]
    pub fn last_pkey(&self) -> Option<Pkey> {
        self.last
    }

    /// Watermark the cursor reads at.
    #[must_use]
    pub fn watermark(&self) -> Pkey {
        self.watermark
    }

    /// Number of rows the cursor yields over its whole life.
    ///
    /// Filters the candidate set down to visible rows without reading any
    /// record body, so the cost is O(matches). Calling it again, or before,
    /// during or after iteration, returns the same number.
    pub fn count_matches(&mut self) -> CoreResult<usize> {
        self.filter_pending()?;
        Ok(self.yielded + self.pending.len())
    }

    /// Drains the cursor into a vector.
    pub fn collect_rows(self) -> CoreResult<Vec<Row>> {
        self.collect()
    }

    fn remaining_budget(&self) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(self.yielded))
    }

    fn filter_pending(&mut self) -> CoreResult<()> {
        if !self.filtered {
            let mut visible = VecDeque::with_capacity(self.pending.len());
            for pkey in std::mem::take(&mut self.pending) {
                if self.visible_segment(pkey)?.is_some() {
                    visible.push_back(pkey);
                }
            }
            self.pending = visible;
            self.filtered = true;
        }
        if let Some(budget) = self.remaining_budget() {
            self.pending.truncate(budget);
        }
        Ok(())
    }

    /// The segment holding `pkey` if the row is visible to this cursor.
    fn visible_segment(&self, pkey: Pkey) -> CoreResult<Option<&Arc<Segment>>> {
        if pkey > self.watermark {
            return Ok(None);
        }
        let segment = locate(&self.segments, pkey).ok_or_else(|| CoreError::Integrity {
            table: self.table.clone(),
            message: format!("index entry refers to missing record {pkey}"),
        })?;
        let state: SlotState = segment.slot_state(pkey).ok_or_else(|| CoreError::Integrity {
            table: self.table.clone(),
            message: format!("segment {} lost record {pkey}", segment.id()),
        })?;
        Ok(state
            .is_visible(self.watermark, self.include_history)
            .then_some(segment))
    }

    fn read_row(&self, segment: &Segment, pkey: Pkey) -> CoreResult<Row> {
        let record = segment.get(pkey)?.ok_or_else(|| CoreError::Integrity {
            table: self.table.clone(),
            message: format!("segment {} lost record {pkey}", segment.id()),
        })?;
        let values = decode(&record.payload, &self.schema)
            .map_err(|e| CoreError::from_codec(&self.table, e))?;
        Ok(Row {
            pkey,
            fields: self.schema.named(&values),
        })
    }
}

impl Iterator for ResultCursor {
    type Item = CoreResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining_budget() == Some(0) {
                self.pending.clear();
                return None;
            }
            let pkey = self.pending.pop_front()?;
            let row = match self.visible_segment(pkey) {
                Ok(Some(segment)) => self.read_row(segment, pkey),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            if row.is_ok() {
                self.yielded += 1;
                self.last = Some(pkey);
            }
            return Some(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentRecord;
    use crate::types::SegmentId;
    use tabula_codec::{encode, ColumnDef, DataType, Record};
    use tabula_storage::InMemoryBackend;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                ColumnDef::new("card", DataType::Varchar),
                ColumnDef::new("amt", DataType::BigInt),
            ])
            .unwrap(),
        )
    }

    /// Three versions: 1 and 2 are rows, 3 replaces 1.
    fn segments(schema: &Schema) -> Vec<Arc<Segment>> {
        let segment = Segment::create(SegmentId::new(1), Arc::new(InMemoryBackend::new())).unwrap();
        for (pkey, lineage, amt) in [(1, 1, 10), (2, 2, 20), (3, 1, 30)] {
            let row = encode(&Record::new(vec![Value::from("c"), Value::BigInt(amt)]), schema).unwrap();
            segment
                .append(&SegmentRecord::put(Pkey::new(pkey), Pkey::new(lineage), row))
                .unwrap();
        }
        segment.mark_superseded(Pkey::new(1), Pkey::new(3));
        vec![Arc::new(segment)]
    }

    fn cursor(watermark: u64, history: bool, limit: Option<usize>) -> ResultCursor {
        let schema = schema();
        let segs = segments(&schema);
        ResultCursor::new(
            "t",
            schema,
            segs,
            Pkey::new(watermark),
            vec![Pkey::new(3), Pkey::new(2), Pkey::new(1)],
            history,
            limit,
        )
    }

    fn amounts(cursor: ResultCursor) -> Vec<i64> {
        cursor
            .collect_rows()
            .unwrap()
            .iter()
            .map(|r| r.get("amt").and_then(Value::as_integer).unwrap())
            .collect()
    }

    #[test]
    fn skips_superseded_versions() {
        assert_eq!(amounts(cursor(3, false, None)), vec![30, 20]);
    }

    #[test]
    fn older_watermark_sees_older_version() {
        assert_eq!(amounts(cursor(2, false, None)), vec![20, 10]);
    }

    #[test]
    fn history_returns_every_version() {
        assert_eq!(amounts(cursor(3, true, None)), vec![30, 20, 10]);
    }

    #[test]
    fn count_is_stable_across_iteration() {
        let mut c = cursor(3, false, None);
        assert_eq!(c.count_matches().unwrap(), 2);
        let first = c.next().unwrap().unwrap();
        assert_eq!(first.pkey(), Pkey::new(3));
        assert_eq!(c.count_matches().unwrap(), 2);
        assert_eq!(c.count_matches().unwrap(), 2);
        assert!(c.next().is_some());
        assert!(c.next().is_none());
        assert_eq!(c.count_matches().unwrap(), 2);
        assert_eq!(c.last_pkey(), Some(Pkey::new(2)));
    }

    #[test]
    fn limit_caps_rows_and_count() {
        let mut c = cursor(3, true, Some(2));
        assert_eq!(c.count_matches().unwrap(), 2);
        assert_eq!(amounts(c), vec![30, 20]);
    }

    #[test]
    fn row_accessors_follow_schema_order() {
        let row = cursor(3, false, None).next().unwrap().unwrap();
        let names: Vec<&str> = row.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["card", "amt"]);
        assert_eq!(row.to_field_map().len(), 2);
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn missing_record_is_an_integrity_error() {
        let schema = schema();
        let segs = segments(&schema);
        let mut c = ResultCursor::new("t", schema, segs, Pkey::new(9), vec![Pkey::new(9)], false, None);
        assert!(matches!(c.next(), Some(Err(CoreError::Integrity { .. }))));
    }
}
