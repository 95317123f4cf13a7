//! Thread-safe LRU cache with O(1) operations using `IndexMap`.
//!
//! `IndexMap` preserves insertion order (front = LRU, back = MRU), so
//! recency updates are a remove + re-insert and eviction pops the front.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe LRU cache with O(1) amortized operations.
pub struct LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Maximum capacity.
    capacity: usize,
    /// IndexMap preserves insertion order (front = LRU, back = MRU).
    inner: RwLock<IndexMap<K, V>>,
    /// Eviction count (atomic for lock-free reads).
    evictions: AtomicU64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a new LRU cache with the given capacity.
    ///
    /// A zero capacity is clamped to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(IndexMap::with_capacity(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the capacity of the cache.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the number of evictions performed.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Inserts a key-value pair, evicting the LRU entry at capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write();

        // Existing key: move to back with the new value.
        if inner.shift_remove(&key).is_some() {
            inner.insert(key, value);
            return;
        }

        if inner.len() >= self.capacity && inner.shift_remove_index(0).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        inner.insert(key, value);
    }

    /// Gets a value by key, updating recency.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        let value = inner.shift_remove(key)?;
        inner.insert(key.clone(), value.clone());
        Some(value)
    }

    /// Gets a value without updating recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Removes a key from the cache.
    pub fn remove(&self, key: &K) {
        self.inner.write().shift_remove(key);
    }

    /// Keeps only the entries for which `keep` returns true.
    ///
    /// Relative order of the survivors is preserved.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.inner.write().retain(|k, v| keep(k, v));
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
