//! Cross-crate integration test helpers.
//!
//! [`ModelHarness`] drives a card table and a plain in-memory model side by
//! side, so any divergence in visible rows shows up as a test failure.

use crate::fixtures::{scenarios, TestDatabase};
use crate::generators::{CardOp, CardRow};
use tabula_codec::{field_map, Value};
use tabula_core::{Connection, ReadOption, Row, TraverseOption, WriteOptions};

/// Name of the table the harness drives.
pub const HARNESS_TABLE: &str = "cards";

/// A test harness comparing the database against a reference model.
pub struct ModelHarness {
    /// The database under test.
    pub db: TestDatabase,
    /// Live rows, in insertion order of their lineage.
    rows: Vec<Option<CardRow>>,
}

impl ModelHarness {
    /// Creates a harness over an in-memory database.
    pub fn memory() -> Self {
        Self::with_database(TestDatabase::memory())
    }

    /// Creates a harness over a database in a temporary directory.
    pub fn file() -> Self {
        Self::with_database(TestDatabase::file())
    }

    fn with_database(db: TestDatabase) -> Self {
        db.connect()
            .create_table(scenarios::card_table(HARNESS_TABLE))
            .expect("Failed to create table");
        Self {
            db,
            rows: Vec::new(),
        }
    }

    fn conn(&self) -> Connection {
        self.db.connect()
    }

    /// Applies `op` to both the database and the model, checking the
    /// affected row counts agree.
    pub fn apply(&mut self, op: &CardOp) {
        let conn = self.conn();
        let options = WriteOptions::relaxed();
        match op {
            CardOp::Put(row) => {
                let fields = scenarios::card_row(&row.card, &row.mcc, row.p_biz_date);
                conn.put(HARNESS_TABLE, &fields, &options)
                    .expect("Failed to put row");
                self.rows.push(Some(row.clone()));
            }
            CardOp::Update { card, mcc } => {
                let condition = field_map([("card", card.as_str())]);
                let values = field_map([("mcc", mcc.as_str())]);
                let updated = conn
                    .update(HARNESS_TABLE, &condition, &values, &options)
                    .expect("Failed to update rows");
                let mut expected = 0;
                for row in self.rows.iter_mut().flatten() {
                    if row.card == *card {
                        row.mcc = mcc.clone();
                        expected += 1;
                    }
                }
                assert_eq!(updated, expected, "update count mismatch for {card}");
            }
            CardOp::Delete { card } => {
                let condition = field_map([("card", card.as_str())]);
                let deleted = conn
                    .delete(HARNESS_TABLE, &condition, &options)
                    .expect("Failed to delete rows");
                let mut expected = 0;
                for slot in &mut self.rows {
                    if slot.as_ref().is_some_and(|row| row.card == *card) {
                        *slot = None;
                        expected += 1;
                    }
                }
                assert_eq!(deleted, expected, "delete count mismatch for {card}");
            }
            CardOp::Seal => {
                conn.seal(HARNESS_TABLE).expect("Failed to seal");
            }
        }
    }

    /// Live rows according to the model, sorted.
    pub fn expected_rows(&self) -> Vec<CardRow> {
        let mut rows: Vec<CardRow> = self.rows.iter().flatten().cloned().collect();
        rows.sort();
        rows
    }

    /// Live rows according to a full traversal, sorted.
    pub fn actual_rows(&self) -> Vec<CardRow> {
        let cursor = self
            .conn()
            .traverse_with(HARNESS_TABLE, &TraverseOption::new())
            .expect("Failed to traverse");
        let mut rows: Vec<CardRow> = cursor
            .map(|row| card_row_from(&row.expect("Failed to read row")))
            .collect();
        rows.sort();
        rows
    }

    /// Checks traversal and per-card queries against the model.
    pub fn verify(&self) {
        assert_eq!(self.actual_rows(), self.expected_rows());

        let conn = self.conn();
        for card in (0..crate::generators::CARD_POOL).map(|i| format!("card{i}")) {
            let mut cursor = conn
                .query(HARNESS_TABLE, &ReadOption::new().bind("card", card.as_str()))
                .expect("Failed to query");
            let expected = self.rows.iter().flatten().filter(|r| r.card == card).count();
            assert_eq!(
                cursor.count_matches().expect("Failed to count"),
                expected,
                "query count mismatch for {card}"
            );
        }
        conn.verify(HARNESS_TABLE).expect("Index verification failed");
    }

    /// Closes and reopens a file-backed harness.
    pub fn reopen(self) -> Self {
        Self {
            db: self.db.reopen(),
            rows: self.rows,
        }
    }

    /// Number of live rows in the model.
    pub fn live_count(&self) -> usize {
        self.rows.iter().flatten().count()
    }
}

/// Converts a card table row back into a [`CardRow`].
///
/// # Panics
///
/// Panics if a field is missing or has the wrong type.
pub fn card_row_from(row: &Row) -> CardRow {
    let text = |name: &str| match row.get(name) {
        Some(Value::Varchar(s)) => s.clone(),
        other => panic!("unexpected {name}: {other:?}"),
    };
    let p_biz_date = match row.get("p_biz_date") {
        Some(Value::BigInt(v)) => *v,
        other => panic!("unexpected p_biz_date: {other:?}"),
    };
    CardRow {
        card: text("card"),
        mcc: text("mcc"),
        p_biz_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(card: &str, mcc: &str, p_biz_date: i64) -> CardOp {
        CardOp::Put(CardRow {
            card: card.into(),
            mcc: mcc.into(),
            p_biz_date,
        })
    }

    #[test]
    fn harness_tracks_mixed_operations() {
        let mut harness = ModelHarness::memory();
        harness.apply(&put("card0", "mcc0", 1));
        harness.apply(&put("card1", "mcc0", 2));
        harness.apply(&put("card0", "mcc1", 3));
        harness.apply(&CardOp::Update {
            card: "card0".into(),
            mcc: "mcc3".into(),
        });
        harness.apply(&CardOp::Seal);
        harness.apply(&CardOp::Delete {
            card: "card1".into(),
        });
        harness.verify();
        assert_eq!(harness.live_count(), 2);
        assert!(harness.actual_rows().iter().all(|r| r.mcc == "mcc3"));
    }

    #[test]
    fn harness_survives_reopen() {
        let mut harness = ModelHarness::file();
        harness.apply(&put("card2", "mcc0", 3));
        harness.apply(&CardOp::Update {
            card: "card2".into(),
            mcc: "mcc1".into(),
        });
        let harness = harness.reopen();
        harness.verify();
    }
}
