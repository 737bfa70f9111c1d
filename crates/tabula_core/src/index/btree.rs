//! BTree index implementation.

use crate::index::traits::{Index, IndexDef, KeyRange};
use crate::types::Pkey;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::ops::Bound;

/// Ordered index over encoded keys.
///
/// Entries are `(key, Reverse(pkey))` pairs, so within one key the newest
/// version comes first. Because key components are self-delimiting, a
/// prefix scan is a contiguous walk starting at the prefix.
///
/// # Example
///
/// ```rust,ignore
/// let mut index = BTreeIndex::new(IndexDef::new("card_idx", ["card"]));
/// index.insert(encode_key([&Value::from("card2")]), Pkey::new(1));
/// let hits = index.lookup(&encode_key([&Value::from("card2")]));
/// ```
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    def: IndexDef,
    entries: BTreeSet<(Vec<u8>, Reverse<Pkey>)>,
}

impl BTreeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeSet::new(),
        }
    }

    fn walk_from<'a>(
        &'a self,
        start: &[u8],
    ) -> impl Iterator<Item = &'a (Vec<u8>, Reverse<Pkey>)> + 'a {
        self.entries.range((
            Bound::Included((start.to_vec(), Reverse(Pkey::MAX))),
            Bound::Unbounded,
        ))
    }
}

impl Index for BTreeIndex {
    fn def(&self) -> &IndexDef {
        &self.def
    }

    fn insert(&mut self, key: Vec<u8>, pkey: Pkey) {
        self.entries.insert((key, Reverse(pkey)));
    }

    fn remove(&mut self, key: &[u8], pkey: Pkey) -> bool {
        self.entries.remove(&(key.to_vec(), Reverse(pkey)))
    }

    fn lookup(&self, key: &[u8]) -> Vec<Pkey> {
        self.walk_from(key)
            .take_while(|(k, _)| k.as_slice() == key)
            .map(|(_, Reverse(pkey))| *pkey)
            .collect()
    }

    fn scan(&self, range: &KeyRange) -> Vec<Pkey> {
        self.walk_from(range.start())
            .take_while(|(k, _)| k.starts_with(&range.prefix) && range.below_upper(k))
            .filter(|(k, _)| range.above_lower(k))
            .map(|(_, Reverse(pkey))| *pkey)
            .collect()
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.walk_from(key)
            .next()
            .is_some_and(|(k, _)| k.as_slice() == key)
    }

    fn entries(&self) -> Vec<(Vec<u8>, Pkey)> {
        self.entries
            .iter()
            .map(|(k, Reverse(pkey))| (k.clone(), *pkey))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tabula_codec::{encode_key, Value};

    fn card_index() -> BTreeIndex {
        BTreeIndex::new(IndexDef::new("card_date", ["card", "p_biz_date"]))
    }

    fn key(card: &str, date: i64) -> Vec<u8> {
        encode_key([&Value::from(card), &Value::BigInt(date)])
    }

    fn prefix(card: &str) -> Vec<u8> {
        encode_key([&Value::from(card)])
    }

    #[test]
    fn lookup_is_newest_first() {
        let mut index = card_index();
        index.insert(key("card2", 3), Pkey::new(1));
        index.insert(key("card2", 3), Pkey::new(5));
        index.insert(key("card2", 3), Pkey::new(3));

        assert_eq!(
            index.lookup(&key("card2", 3)),
            vec![Pkey::new(5), Pkey::new(3), Pkey::new(1)]
        );
        assert!(index.lookup(&key("card2", 4)).is_empty());
    }

    #[test]
    fn prefix_scan_orders_by_remaining_field_then_sequence() {
        let mut index = card_index();
        index.insert(key("card2", 9), Pkey::new(1));
        index.insert(key("card2", 3), Pkey::new(2));
        index.insert(key("card20", 1), Pkey::new(3));
        index.insert(key("card2", 3), Pkey::new(4));
        index.insert(key("card1", 5), Pkey::new(5));

        assert_eq!(
            index.scan(&KeyRange::prefix(prefix("card2"))),
            vec![Pkey::new(4), Pkey::new(2), Pkey::new(1)]
        );
    }

    #[test]
    fn range_scan_on_next_field() {
        let mut index = card_index();
        for (date, pkey) in [(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)] {
            index.insert(key("card0", date), Pkey::new(pkey));
        }
        index.insert(key("card1", 3), Pkey::new(6));

        let range = KeyRange {
            prefix: prefix("card0"),
            lower: Bound::Excluded(key("card0", 1)),
            upper: Bound::Included(key("card0", 4)),
        };
        assert_eq!(
            index.scan(&range),
            vec![Pkey::new(2), Pkey::new(3), Pkey::new(4)]
        );

        let open_low = KeyRange {
            prefix: prefix("card0"),
            lower: Bound::Unbounded,
            upper: Bound::Excluded(key("card0", 3)),
        };
        assert_eq!(index.scan(&open_low), vec![Pkey::new(1), Pkey::new(2)]);
    }

    #[test]
    fn remove_and_contains() {
        let mut index = card_index();
        index.insert(key("a", 1), Pkey::new(1));
        assert!(index.contains(&key("a", 1)));
        assert!(index.remove(&key("a", 1), Pkey::new(1)));
        assert!(!index.remove(&key("a", 1), Pkey::new(1)));
        assert!(!index.contains(&key("a", 1)));
        assert!(index.is_empty());
    }

    proptest! {
        #[test]
        fn prefix_scan_matches_filter(entries in prop::collection::vec((0u8..4, 0i64..6), 0..40)) {
            let mut index = card_index();
            for (pkey, (card, date)) in entries.iter().enumerate() {
                index.insert(key(&format!("c{card}"), *date), Pkey::new(pkey as u64 + 1));
            }
            let mut expected: Vec<(Vec<u8>, Pkey)> = entries
                .iter()
                .enumerate()
                .filter(|(_, (card, _))| *card == 2)
                .map(|(pkey, (card, date))| (key(&format!("c{card}"), *date), Pkey::new(pkey as u64 + 1)))
                .collect();
            expected.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            let expected: Vec<Pkey> = expected.into_iter().map(|(_, p)| p).collect();
            prop_assert_eq!(index.scan(&KeyRange::prefix(prefix("c2"))), expected);
        }
    }
}
