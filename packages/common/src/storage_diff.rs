use std::collections::HashMap;
use std::collections::hash_map;

use serde::{Deserialize, Serialize};

/// Pending per-owner byte deltas, keyed by owner (user) id.
///
/// A diff is plain data until a committing root transaction hands it to the
/// quota store. Positive deltas credit usage, negative ones release it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDiff(HashMap<i32, i64>);

impl StorageDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// A diff with a single owner entry.
    pub fn single(owner_id: i32, delta: i64) -> Self {
        let mut diff = Self::new();
        diff.add(owner_id, delta);
        diff
    }

    /// Add `delta` to the owner's entry, creating it if absent.
    pub fn add(&mut self, owner_id: i32, delta: i64) {
        *self.0.entry(owner_id).or_insert(0) += delta;
    }

    /// Sum every entry of `other` into `self`.
    pub fn merge(&mut self, other: StorageDiff) {
        for (owner_id, delta) in other.0 {
            self.add(owner_id, delta);
        }
    }

    /// Delta recorded for an owner, zero when absent.
    pub fn get(&self, owner_id: i32) -> i64 {
        self.0.get(&owner_id).copied().unwrap_or(0)
    }

    /// True when there is nothing to apply (no entries, or all entries zero).
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|delta| *delta == 0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, i32, i64> {
        self.0.iter()
    }

    /// Owner ids in ascending order, so quota rows are always updated in the
    /// same order by concurrent committers.
    pub fn owners(&self) -> Vec<i32> {
        let mut owners: Vec<i32> = self.0.keys().copied().collect();
        owners.sort_unstable();
        owners
    }
}

impl From<HashMap<i32, i64>> for StorageDiff {
    fn from(map: HashMap<i32, i64>) -> Self {
        Self(map)
    }
}

impl FromIterator<(i32, i64)> for StorageDiff {
    fn from_iter<T: IntoIterator<Item = (i32, i64)>>(iter: T) -> Self {
        let mut diff = Self::new();
        for (owner_id, delta) in iter {
            diff.add(owner_id, delta);
        }
        diff
    }
}

impl IntoIterator for StorageDiff {
    type Item = (i32, i64);
    type IntoIter = hash_map::IntoIter<i32, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
