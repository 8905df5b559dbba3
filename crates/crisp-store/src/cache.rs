//! Bounded least-recently-used cache for hot ranges.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Default number of cached entries.
pub const DEFAULT_CAPACITY: usize = 1000;

/// LRU cache; when full, inserting evicts the least recently used entry.
#[derive(Debug)]
pub struct EvictionCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> EvictionCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Insert or replace, marking the entry most recently used.
    pub fn put(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    /// Look up an entry, refreshing its recency.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Whether `key` is cached. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}

impl<K: Hash + Eq, V> Default for EvictionCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
