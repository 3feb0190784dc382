//! Versioned in-memory table with compare-and-swap writes.

use std::collections::BTreeMap;
use std::fmt::Debug;

use tether_core::{EntityType, StorageError, TetherResult, Version, Versioned};

/// One logical table. Keys are ordered so listings are deterministic.
#[derive(Debug, Clone)]
pub(crate) struct VersionedTable<K: Ord + Clone + Debug, T: Clone> {
    entity_type: EntityType,
    rows: BTreeMap<K, Versioned<T>>,
}

impl<K: Ord + Clone + Debug, T: Clone> VersionedTable<K, T> {
    pub(crate) fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            rows: BTreeMap::new(),
        }
    }

    fn key_str(key: &K) -> String {
        format!("{:?}", key)
    }

    pub(crate) fn get(&self, key: &K) -> Option<Versioned<T>> {
        self.rows.get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Insert a row that must not exist yet.
    pub(crate) fn insert_new(&mut self, key: K, data: T) -> TetherResult<Version> {
        if self.rows.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                entity_type: self.entity_type,
                key: Self::key_str(&key),
            }
            .into());
        }
        self.rows.insert(key, Versioned::initial(data));
        Ok(1)
    }

    /// Compare-and-swap write. `expected = None` means the row must be absent.
    pub(crate) fn put(&mut self, key: K, expected: Option<Version>, data: T) -> TetherResult<Version> {
        let actual = self.rows.get(&key).map(|r| r.version);
        if actual != expected {
            return Err(StorageError::StaleVersion {
                entity_type: self.entity_type,
                key: Self::key_str(&key),
                expected,
                actual,
            }
            .into());
        }
        let version = actual.map_or(1, |v| v + 1);
        self.rows.insert(key, Versioned { version, data });
        Ok(version)
    }

    /// Compare-and-swap write of a row that must exist.
    pub(crate) fn update(&mut self, key: K, expected: Version, data: T) -> TetherResult<Version> {
        if !self.rows.contains_key(&key) {
            return Err(StorageError::NotFound {
                entity_type: self.entity_type,
                key: Self::key_str(&key),
            }
            .into());
        }
        self.put(key, Some(expected), data)
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Versioned<T>> {
        self.rows.remove(key)
    }

    /// Remove every row whose key matches. Returns the count removed.
    pub(crate) fn remove_where(&mut self, mut pred: impl FnMut(&K, &T) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|k, row| !pred(k, &row.data));
        before - self.rows.len()
    }

    pub(crate) fn keys_where(&self, mut pred: impl FnMut(&K, &T) -> bool) -> Vec<K> {
        self.rows
            .iter()
            .filter(|&(k, row)| pred(k, &row.data))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn values_where(&self, mut pred: impl FnMut(&K, &T) -> bool) -> Vec<T> {
        self.rows
            .iter()
            .filter(|&(k, row)| pred(k, &row.data))
            .map(|(_, row)| row.data.clone())
            .collect()
    }

    /// Edit every matching row in place, bumping versions of rows the edit
    /// reports as changed. Returns the count changed.
    pub(crate) fn modify_where(&mut self, mut f: impl FnMut(&K, &mut T) -> bool) -> usize {
        let mut changed = 0;
        for (key, row) in self.rows.iter_mut() {
            if f(key, &mut row.data) {
                row.version += 1;
                changed += 1;
            }
        }
        changed
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Versions start at 1 and grow by exactly one per accepted write;
        /// rejected writes leave the row untouched.
        #[test]
        fn prop_versions_step_by_one(writes in proptest::collection::vec((any::<bool>(), 0u8..4), 1..40)) {
            let mut t: VersionedTable<u8, u8> = VersionedTable::new(EntityType::HardcoreState);
            let mut current: Option<Version> = None;
            for (fresh, value) in writes {
                let expected = if fresh { current } else { current.map(|v| v + 1) };
                match t.put(0, expected, value) {
                    Ok(version) => {
                        prop_assert_eq!(version, current.map_or(1, |v| v + 1));
                        current = Some(version);
                    }
                    Err(err) => {
                        prop_assert!(err.is_retryable());
                        prop_assert_eq!(t.get(&0).map(|r| r.version), current);
                    }
                }
            }
        }
    }
}
