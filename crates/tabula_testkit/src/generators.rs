//! Property-based test generators using proptest.
//!
//! Strategies here produce rows for the card table
//! ([`scenarios::card_table`](crate::fixtures::scenarios::card_table)) and
//! operation sequences over it.

use proptest::prelude::*;
use tabula_codec::{DataType, Value};

/// Number of distinct cards the generators draw from. Kept small so
/// updates and deletes hit existing rows often.
pub const CARD_POOL: usize = 8;

/// Strategy for generating valid table and index names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for card identifiers drawn from a small pool.
pub fn card_strategy() -> impl Strategy<Value = String> {
    (0..CARD_POOL).prop_map(|i| format!("card{i}"))
}

/// Strategy for merchant category codes.
pub fn mcc_strategy() -> impl Strategy<Value = String> {
    (0..4usize).prop_map(|i| format!("mcc{i}"))
}

/// A card table row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CardRow {
    /// Card identifier.
    pub card: String,
    /// Merchant category code.
    pub mcc: String,
    /// Business date.
    pub p_biz_date: i64,
}

/// Strategy for card rows.
pub fn card_row_strategy() -> impl Strategy<Value = CardRow> {
    (card_strategy(), mcc_strategy(), 0..1_000i64).prop_map(|(card, mcc, p_biz_date)| CardRow {
        card,
        mcc,
        p_biz_date,
    })
}

/// Operations applied against the card table.
#[derive(Debug, Clone)]
pub enum CardOp {
    /// Insert a row.
    Put(CardRow),
    /// Set `mcc` on every row of `card`.
    Update {
        /// Matched card.
        card: String,
        /// New merchant category code.
        mcc: String,
    },
    /// Delete every row of `card`.
    Delete {
        /// Matched card.
        card: String,
    },
    /// Seal the active segment.
    Seal,
}

/// Strategy for a single operation, weighted towards puts.
pub fn card_op_strategy() -> impl Strategy<Value = CardOp> {
    prop_oneof![
        6 => card_row_strategy().prop_map(CardOp::Put),
        2 => (card_strategy(), mcc_strategy()).prop_map(|(card, mcc)| CardOp::Update { card, mcc }),
        1 => card_strategy().prop_map(|card| CardOp::Delete { card }),
        1 => Just(CardOp::Seal),
    ]
}

/// Strategy for a sequence of operations.
pub fn card_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<CardOp>> {
    prop::collection::vec(card_op_strategy(), 1..max_len)
}

/// Strategy for a column type paired with a value of that type.
pub fn typed_value_strategy() -> impl Strategy<Value = (DataType, Value)> {
    prop_oneof![
        any::<bool>().prop_map(|v| (DataType::Bool, Value::Bool(v))),
        any::<i16>().prop_map(|v| (DataType::SmallInt, Value::SmallInt(v))),
        any::<i32>().prop_map(|v| (DataType::Int, Value::Int(v))),
        any::<i64>().prop_map(|v| (DataType::BigInt, Value::BigInt(v))),
        any::<i64>().prop_map(|v| (DataType::Timestamp, Value::Timestamp(v))),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,24}")
            .expect("Invalid regex")
            .prop_map(|v| (DataType::Varchar, Value::Varchar(v))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn card_rows_stay_in_pool() {
        let mut runner = TestRunner::default();
        for _ in 0..100 {
            let row = card_row_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            let index: usize = row.card.trim_start_matches("card").parse().unwrap();
            assert!(index < CARD_POOL);
            assert!((0..1_000).contains(&row.p_biz_date));
        }
    }

    #[test]
    fn table_names_are_valid() {
        let mut runner = TestRunner::default();
        for _ in 0..100 {
            let name = table_name_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(!name.is_empty());
            assert!(name.len() <= 16);
        }
    }

    #[test]
    fn typed_values_match_their_type() {
        let mut runner = TestRunner::default();
        for _ in 0..100 {
            let (data_type, value) = typed_value_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert_eq!(value.data_type(), Some(data_type));
        }
    }
}
