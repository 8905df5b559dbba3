//! Ordered index of synced ranges, keyed by range start.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// Ordered map from range start to the value recorded for it.
#[derive(Debug, Clone)]
pub struct RangeIndex<V> {
    entries: BTreeMap<u64, V>,
}

impl<V> RangeIndex<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the value at `key`, returning the key.
    pub fn insert(&mut self, key: u64, value: V) -> u64 {
        self.entries.insert(key, value);
        key
    }

    /// Exact lookup.
    pub fn search(&self, key: u64) -> Option<&V> {
        self.entries.get(&key)
    }

    /// Entries with keys in `bounds`, in key order.
    pub fn range<R: RangeBounds<u64>>(&self, bounds: R) -> impl Iterator<Item = (u64, &V)> {
        self.entries.range(bounds).map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for RangeIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}
