// Copyright 2026 lakecache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::HashSet, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

use crate::lru::{Evicted, Lru, LruConfig};

/// Thread-safe in-memory lru cache keyed by key hash.
///
/// All operations are serialized by a single mutex. Eviction only affects memory, evicted entries are returned to the
/// caller and logged.
#[derive(Debug)]
pub struct MemoryCache<T> {
    inner: Arc<Mutex<Lru<T>>>,
}

impl<T> Clone for MemoryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new(LruConfig::default())
    }
}

impl<T> MemoryCache<T> {
    /// Create a memory cache with the given limits.
    pub fn new(config: LruConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Lru::new(config))),
        }
    }

    /// Get the value and refresh its recency.
    pub fn get(&self, key: &str) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().get(key).cloned()
    }

    /// Get the value without refreshing its recency.
    pub fn peek(&self, key: &str) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().peek(key).cloned()
    }

    /// Insert or update an entry, returning the entries evicted to satisfy the limits.
    pub fn insert(&self, key: String, value: T, cost: usize) -> Vec<Evicted<T>> {
        let evicted = self.inner.lock().insert(key, value, cost);
        Self::trace_evicted(&evicted);
        evicted
    }

    /// Backfill an entry as the least recently used one, only if the key is absent and it fits without evicting.
    ///
    /// Returns `false` if the entry is not inserted.
    pub fn insert_cold(&self, key: String, value: T, cost: usize) -> bool {
        self.inner.lock().insert_cold(key, value, cost)
    }

    /// Remove the entry with the given key.
    pub fn remove(&self, key: &str) -> Option<T> {
        self.inner.lock().remove(key)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Check if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    /// Snapshot of all live keys.
    pub fn keys(&self) -> HashSet<String> {
        self.inner.lock().keys()
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed cost of all entries.
    pub fn usage(&self) -> usize {
        self.inner.lock().usage()
    }

    /// Lock the lru.
    ///
    /// Work done while holding the guard is ordered with every other operation on the cache.
    pub fn lock(&self) -> MutexGuard<'_, Lru<T>> {
        self.inner.lock()
    }

    /// Current limits.
    pub fn config(&self) -> LruConfig {
        *self.inner.lock().config()
    }

    /// Replace the limits, evicting until they hold.
    pub fn update(&self, config: LruConfig) -> Vec<Evicted<T>> {
        let evicted = self.inner.lock().update(config);
        Self::trace_evicted(&evicted);
        evicted
    }

    fn trace_evicted(evicted: &[Evicted<T>]) {
        for e in evicted {
            tracing::trace!(key = e.key, cost = e.cost, "[memory]: entry evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test_log::test]
    fn test_memory_cache_concurrent_inserts() {
        let cache = MemoryCache::new(LruConfig::default().with_count_limit(64));

        let handles = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.insert(format!("{t}-{i}"), i, 1);
                        cache.get(&format!("{t}-{}", i / 2));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 64);
        assert_eq!(cache.usage(), 64);
        assert_eq!(cache.keys().len(), 64);
    }

    #[test_log::test]
    fn test_memory_cache_tombstone_values() {
        let cache = MemoryCache::<Option<Vec<u8>>>::default();
        cache.insert("miss".to_string(), None, 1);
        cache.insert("hit".to_string(), Some(vec![1, 2, 3]), 3);

        assert_eq!(cache.get("miss"), Some(None));
        assert_eq!(cache.get("hit"), Some(Some(vec![1, 2, 3])));
        assert_eq!(cache.get("never"), None);
        assert_eq!(cache.usage(), 4);
    }

    #[test_log::test]
    fn test_memory_cache_insert_cold() {
        let cache = MemoryCache::new(LruConfig::default().with_count_limit(2));
        assert!(cache.insert_cold("k".to_string(), 1, 1));
        assert!(!cache.insert_cold("k".to_string(), 2, 1));
        assert_eq!(cache.peek("k"), Some(1));

        cache.insert("live".to_string(), 3, 1);
        assert!(!cache.insert_cold("stale".to_string(), 4, 1));
        assert!(cache.contains("live"));
        assert_eq!(cache.remove("k"), Some(1));
        assert!(!cache.contains("k"));
    }

    #[test_log::test]
    fn test_memory_cache_lock() {
        let cache = MemoryCache::default();
        {
            let mut lru = cache.lock();
            lru.insert("a".to_string(), 1, 1);
            lru.insert("b".to_string(), 2, 1);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
    }
}
