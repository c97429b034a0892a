//! A small bounded memo table for dynamic-dependency combinators.

use lru::LruCache;
use std::{hash::Hash, num::NonZeroUsize};

/// Default capacity used by [`flat_map`](crate::Cell::flat_map).
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// An access-ordered, strictly size-capped cache.
///
/// [`flat_map`](crate::Cell::flat_map) uses one of these to memoise the
/// inner node selected for each outer value, so the mapper runs at most once
/// per cached key. When the cap is exceeded the least recently used entry is
/// evicted; flipping back to an evicted key simply re-runs the mapper.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Creates a cache that holds at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .expect("cache capacity must be non-zero");
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Creates a cache with [`DEFAULT_CACHE_CAPACITY`].
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }

    /// Returns the cached value for `key`, inserting `make()` first if the
    /// key is absent. Either way the entry becomes the most recently used.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> V {
        self.entries.get_or_insert(key, make).clone()
    }

    /// The number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_at_cap() {
        let mut cache = BoundedCache::new(2);
        assert_eq!(cache.get_or_insert_with("a", || 1), 1);
        assert_eq!(cache.get_or_insert_with("b", || 2), 2);
        // touch "a" so "b" is the eviction candidate
        assert_eq!(cache.get_or_insert_with("a", || 10), 1);
        assert_eq!(cache.get_or_insert_with("c", || 3), 3);
        assert_eq!(cache.len(), 2);
        // "b" was evicted, so the maker runs again
        assert_eq!(cache.get_or_insert_with("b", || 20), 20);
    }

    #[test]
    fn maker_runs_once_per_cached_key() {
        let mut cache = BoundedCache::with_default_capacity();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(42, || {
                calls += 1;
                "value"
            });
        }
        assert_eq!(calls, 1);
    }
}
