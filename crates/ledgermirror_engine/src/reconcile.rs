//! Identity-keyed reconciliation of collections with change-sets.
//!
//! Two modes exist:
//!
//! - [`merge`] folds a change-set into a persisted collection. Existing
//!   records keep their position (updated in place), new records are
//!   appended in change-set order. Merging the same change-set twice is a
//!   no-op the second time.
//! - [`Accumulator`] collects records before any baseline exists, e.g. the
//!   pages of one paged fetch. Later occurrences of an identity overwrite
//!   earlier ones. Its output order is not part of its contract; use
//!   [`merge`] wherever a persisted order must be preserved.

use crate::record::Record;
use std::collections::HashMap;

/// Result of a reconciliation with counters for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The merged collection.
    pub records: Vec<Record>,
    /// Existing records replaced by a changed version.
    pub updated: usize,
    /// Records appended because their identity was new.
    pub added: usize,
}

/// Merges `changes` into `existing`, preserving the order of `existing`.
pub fn merge(existing: Vec<Record>, changes: Vec<Record>) -> Vec<Record> {
    reconcile(existing, changes).records
}

/// Same as [`merge`], also reporting how many records were updated or added.
pub fn reconcile(existing: Vec<Record>, changes: Vec<Record>) -> Reconciliation {
    // Duplicate identities inside one change-set collapse to the last version.
    let changes = Accumulator::from_records(changes).into_records();

    let index: HashMap<&str, usize> = changes
        .iter()
        .enumerate()
        .map(|(i, record)| (record.id(), i))
        .collect();
    let mut applied = vec![false; changes.len()];
    let mut updated = 0;

    let mut records = Vec::with_capacity(existing.len() + changes.len());
    for record in existing {
        match index.get(record.id()) {
            Some(&i) => {
                records.push(changes[i].clone());
                applied[i] = true;
                updated += 1;
            }
            None => records.push(record),
        }
    }

    let before = records.len();
    records.extend(
        changes
            .iter()
            .zip(&applied)
            .filter(|(_, applied)| !**applied)
            .map(|(record, _)| record.clone()),
    );
    let added = records.len() - before;

    Reconciliation {
        records,
        updated,
        added,
    }
}

/// Last-write-wins accumulation of records with no persisted baseline.
///
/// Each identity keeps the slot of its first occurrence and the value of its
/// last occurrence.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    index: HashMap<String, usize>,
    records: Vec<Record>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an accumulator from a sequence of records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut acc = Self::new();
        acc.extend(records);
        acc
    }

    /// Adds a record, overwriting any earlier record with the same identity.
    pub fn push(&mut self, record: Record) {
        match self.index.get(record.id()) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(record.id().to_string(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Adds every record of `records`.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.push(record);
        }
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was accumulated.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the accumulated records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn rec(id: &str, v: i64) -> Record {
        Record::from_value(json!({"id": id, "v": v}), "id").unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::id).collect()
    }

    #[test]
    fn updates_in_place_and_appends_new() {
        let existing = vec![rec("A", 1), rec("B", 1)];
        let changes = vec![rec("B", 2), rec("C", 1)];

        let result = reconcile(existing, changes);

        assert_eq!(result.records, vec![rec("A", 1), rec("B", 2), rec("C", 1)]);
        assert_eq!(result.updated, 1);
        assert_eq!(result.added, 1);
    }

    #[test]
    fn empty_inputs() {
        assert!(merge(vec![], vec![]).is_empty());
        assert_eq!(merge(vec![rec("A", 1)], vec![]), vec![rec("A", 1)]);
        assert_eq!(merge(vec![], vec![rec("A", 1)]), vec![rec("A", 1)]);
    }

    #[test]
    fn duplicate_changes_collapse_to_last() {
        let existing = vec![rec("A", 1)];
        let changes = vec![rec("B", 1), rec("A", 2), rec("B", 3)];

        let merged = merge(existing, changes);

        assert_eq!(merged, vec![rec("A", 2), rec("B", 3)]);
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let existing = vec![rec("A", 1), rec("B", 1), rec("D", 1)];
        let changes = vec![rec("D", 5), rec("C", 1), rec("A", 9)];

        let once = merge(existing, changes.clone());
        let twice = reconcile(once.clone(), changes);

        assert_eq!(twice.records, once);
        assert_eq!(twice.added, 0);
    }

    #[test]
    fn accumulator_keeps_first_slot_last_value() {
        let mut acc = Accumulator::new();
        acc.push(rec("A", 1));
        acc.push(rec("B", 1));
        acc.push(rec("A", 2));

        assert_eq!(acc.len(), 2);
        assert_eq!(acc.into_records(), vec![rec("A", 2), rec("B", 1)]);
    }

    fn unique_records(max: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::btree_set(0u8..40, 0..max).prop_flat_map(|ids| {
            let ids: Vec<u8> = ids.into_iter().collect();
            let n = ids.len();
            (Just(ids), prop::collection::vec(0i64..5, n)).prop_map(|(ids, vs)| {
                ids.iter()
                    .zip(vs)
                    .map(|(id, v)| rec(&format!("id{id}"), v))
                    .collect()
            })
        })
    }

    fn change_set(max: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::vec((0u8..40, 0i64..5), 0..max).prop_map(|items| {
            items
                .into_iter()
                .map(|(id, v)| rec(&format!("id{id}"), v))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn every_identity_exactly_once(existing in unique_records(20), changes in change_set(20)) {
            let expected: HashSet<String> = existing
                .iter()
                .chain(changes.iter())
                .map(|r| r.id().to_string())
                .collect();

            let merged = merge(existing, changes);
            let seen: Vec<&str> = ids(&merged);
            let distinct: HashSet<&str> = seen.iter().copied().collect();

            prop_assert_eq!(seen.len(), distinct.len());
            prop_assert_eq!(distinct.len(), expected.len());
            for id in &expected {
                prop_assert!(distinct.contains(id.as_str()));
            }
        }

        #[test]
        fn untouched_existing_keep_relative_order(existing in unique_records(20), changes in change_set(20)) {
            let changed: HashSet<String> = changes.iter().map(|r| r.id().to_string()).collect();
            let untouched: Vec<String> = existing
                .iter()
                .filter(|r| !changed.contains(r.id()))
                .map(|r| r.id().to_string())
                .collect();

            let merged = merge(existing, changes);
            let in_output: Vec<String> = merged
                .iter()
                .filter(|r| !changed.contains(r.id()))
                .map(|r| r.id().to_string())
                .collect();

            prop_assert_eq!(in_output, untouched);
        }

        #[test]
        fn existing_prefix_keeps_positions(existing in unique_records(20), changes in change_set(20)) {
            let before: Vec<String> = existing.iter().map(|r| r.id().to_string()).collect();
            let merged = merge(existing, changes);
            let prefix: Vec<String> = merged[..before.len()].iter().map(|r| r.id().to_string()).collect();
            prop_assert_eq!(prefix, before);
        }

        #[test]
        fn merge_is_idempotent(existing in unique_records(20), changes in change_set(20)) {
            let once = merge(existing, changes.clone());
            let twice = merge(once.clone(), changes);
            prop_assert_eq!(twice, once);
        }
    }
}
