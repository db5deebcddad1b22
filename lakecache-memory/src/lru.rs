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

use std::{borrow::Borrow, collections::HashSet};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Lru limits config.
///
/// Both limits are enforced independently. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LruConfig {
    /// The ceiling of the summed cost of all entries.
    pub total_cost_limit: Option<usize>,
    /// The ceiling of the entry count.
    pub count_limit: Option<usize>,
}

impl LruConfig {
    /// Set the total cost limit.
    pub fn with_total_cost_limit(mut self, limit: usize) -> Self {
        self.total_cost_limit = Some(limit);
        self
    }

    /// Set the count limit.
    pub fn with_count_limit(mut self, limit: usize) -> Self {
        self.count_limit = Some(limit);
        self
    }
}

/// An entry evicted by the lru algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted<T> {
    /// The key hash of the evicted entry.
    pub key: String,
    /// The evicted value.
    pub value: T,
    /// The cost of the evicted entry.
    pub cost: usize,
}

#[derive(Debug)]
struct Node<T> {
    key: String,
    value: T,
    cost: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Least-recently-used map from key hash to value with cost and count limits.
///
/// Nodes live in a slab and are linked by slab index. The head of the list is the least recently used entry, the tail
/// is the most recently used one.
///
/// [`Lru`] is not synchronized, see [`crate::MemoryCache`] for the shared version.
#[derive(Debug)]
pub struct Lru<T> {
    slab: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,

    head: Option<usize>,
    tail: Option<usize>,

    usage: usize,

    config: LruConfig,
}

impl<T> Default for Lru<T> {
    fn default() -> Self {
        Self::new(LruConfig::default())
    }
}

impl<T> Lru<T> {
    /// Create an empty lru with the given limits.
    pub fn new(config: LruConfig) -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            usage: 0,
            config,
        }
    }

    /// Get the limits config.
    pub fn config(&self) -> &LruConfig {
        &self.config
    }

    /// Replace the limits and evict until the new limits hold.
    pub fn update(&mut self, config: LruConfig) -> Vec<Evicted<T>> {
        self.config = config;
        self.evict()
    }

    /// Summed cost of all entries.
    pub fn usage(&self) -> usize {
        self.usage
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the lru is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the key exists, without touching its recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        String: Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Get the value and mark the entry as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&T>
    where
        String: Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
    {
        let token = *self.index.get(key)?;
        self.unlink(token);
        self.link_back(token);
        self.slab[token].as_ref().map(|node| &node.value)
    }

    /// Get the value without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&T>
    where
        String: Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
    {
        let token = *self.index.get(key)?;
        self.slab[token].as_ref().map(|node| &node.value)
    }

    /// Insert or update an entry as the most recently used one, then evict least recently used entries until both
    /// limits hold again.
    ///
    /// The inserted entry itself is evicted if its cost alone exceeds the total cost limit.
    pub fn insert(&mut self, key: String, value: T, cost: usize) -> Vec<Evicted<T>> {
        match self.index.get(&key).copied() {
            Some(token) => {
                self.unlink(token);
                if let Some(node) = self.slab[token].as_mut() {
                    self.usage = self.usage - node.cost + cost;
                    node.value = value;
                    node.cost = cost;
                }
                self.link_back(token);
            }
            None => {
                let node = Node {
                    key: key.clone(),
                    value,
                    cost,
                    prev: None,
                    next: None,
                };
                let token = self.alloc(node);
                self.index.insert(key, token);
                self.usage += cost;
                self.link_back(token);
            }
        }
        self.evict()
    }

    /// Insert the entry as the least recently used one, only if the key is absent and the entry fits within both
    /// limits without evicting anything.
    ///
    /// Returns `false` and leaves the lru untouched otherwise. Used to backfill entries that are older than every live
    /// one.
    pub fn insert_cold(&mut self, key: String, value: T, cost: usize) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let fits = self.config.total_cost_limit.is_none_or(|limit| self.usage + cost <= limit)
            && self.config.count_limit.is_none_or(|limit| self.len() < limit);
        if !fits {
            return false;
        }

        let node = Node {
            key: key.clone(),
            value,
            cost,
            prev: None,
            next: None,
        };
        let token = self.alloc(node);
        self.index.insert(key, token);
        self.usage += cost;
        self.link_front(token);
        true
    }

    /// Remove the entry with the given key.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T>
    where
        String: Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
    {
        let token = self.index.remove(key)?;
        self.release(token).map(|node| node.value)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.slab.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.usage = 0;
    }

    /// Snapshot of all live keys.
    pub fn keys(&self) -> HashSet<String> {
        self.index.keys().cloned().collect()
    }

    /// Iterate entries from the least recently used to the most recently used.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            lru: self,
            token: self.head,
        }
    }

    fn is_overflow(&self) -> bool {
        self.config.total_cost_limit.is_some_and(|limit| self.usage > limit)
            || self.config.count_limit.is_some_and(|limit| self.len() > limit)
    }

    fn evict(&mut self) -> Vec<Evicted<T>> {
        let mut evicted = vec![];
        while self.is_overflow() {
            let Some(token) = self.head else { break };
            let Some(node) = self.release(token) else { break };
            self.index.remove(&node.key);
            evicted.push(Evicted {
                key: node.key,
                value: node.value,
                cost: node.cost,
            });
        }
        evicted
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(token) => {
                self.slab[token] = Some(node);
                token
            }
            None => {
                self.slab.push(Some(node));
                self.slab.len() - 1
            }
        }
    }

    /// Unlink the node and return its slot to the free list. The index entry must be removed by the caller.
    fn release(&mut self, token: usize) -> Option<Node<T>> {
        self.unlink(token);
        let node = self.slab[token].take()?;
        self.free.push(token);
        self.usage -= node.cost;
        Some(node)
    }

    fn unlink(&mut self, token: usize) {
        let Some(node) = self.slab[token].as_mut() else { return };
        let (prev, next) = (node.prev.take(), node.next.take());

        match prev {
            Some(p) => {
                if let Some(n) = self.slab[p].as_mut() {
                    n.next = next;
                }
            }
            None => {
                if self.head == Some(token) {
                    self.head = next;
                }
            }
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slab[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => {
                if self.tail == Some(token) {
                    self.tail = prev;
                }
            }
        }
    }

    fn link_front(&mut self, token: usize) {
        let head = self.head;
        if let Some(node) = self.slab[token].as_mut() {
            node.prev = None;
            node.next = head;
        }
        match head {
            Some(h) => {
                if let Some(node) = self.slab[h].as_mut() {
                    node.prev = Some(token);
                }
            }
            None => self.tail = Some(token),
        }
        self.head = Some(token);
    }

    fn link_back(&mut self, token: usize) {
        let tail = self.tail;
        if let Some(node) = self.slab[token].as_mut() {
            node.prev = tail;
            node.next = None;
        }
        match tail {
            Some(t) => {
                if let Some(node) = self.slab[t].as_mut() {
                    node.next = Some(token);
                }
            }
            None => self.head = Some(token),
        }
        self.tail = Some(token);
    }
}

/// Iterator over lru entries from the least recently used one.
pub struct Iter<'a, T> {
    lru: &'a Lru<T>,
    token: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (&'a str, &'a T, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.lru.slab[self.token?].as_ref()?;
        self.token = node.next;
        Some((node.key.as_str(), &node.value, node.cost))
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn dump<T>(lru: &Lru<T>) -> Vec<String> {
        lru.iter().map(|(k, _, _)| k.to_string()).collect_vec()
    }

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect_vec()
    }

    #[test]
    fn test_lru_order() {
        let mut lru = Lru::new(LruConfig::default());

        // [a, b, c]
        lru.insert("a".to_string(), 1, 1);
        lru.insert("b".to_string(), 2, 1);
        lru.insert("c".to_string(), 3, 1);
        assert_eq!(dump(&lru), keys(&["a", "b", "c"]));

        // [b, c, a]
        assert_eq!(lru.get("a"), Some(&1));
        assert_eq!(dump(&lru), keys(&["b", "c", "a"]));

        // peek keeps the order
        assert_eq!(lru.peek("b"), Some(&2));
        assert_eq!(dump(&lru), keys(&["b", "c", "a"]));

        // [c, a, b]
        lru.insert("b".to_string(), 20, 1);
        assert_eq!(dump(&lru), keys(&["c", "a", "b"]));
        assert_eq!(lru.peek("b"), Some(&20));

        // [c, b]
        assert_eq!(lru.remove("a"), Some(1));
        assert_eq!(dump(&lru), keys(&["c", "b"]));
        assert_eq!(lru.len(), 2);

        // slot reuse keeps the list consistent
        lru.insert("d".to_string(), 4, 1);
        assert_eq!(dump(&lru), keys(&["c", "b", "d"]));

        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.usage(), 0);
        assert!(dump(&lru).is_empty());
    }

    #[test]
    fn test_lru_count_limit() {
        let mut lru = Lru::new(LruConfig::default().with_count_limit(2));

        assert!(lru.insert("a".to_string(), (), 1).is_empty());
        assert!(lru.insert("b".to_string(), (), 1).is_empty());
        lru.get("a");
        let evicted = lru.insert("c".to_string(), (), 1);

        assert_eq!(evicted.iter().map(|e| e.key.as_str()).collect_vec(), vec!["b"]);
        assert!(lru.contains("a"));
        assert!(lru.contains("c"));
        assert!(!lru.contains("b"));
    }

    #[test]
    fn test_lru_cost_limit() {
        let mut lru = Lru::new(LruConfig::default().with_total_cost_limit(1000));

        lru.insert("a".to_string(), (), 400);
        lru.insert("b".to_string(), (), 400);
        assert_eq!(lru.usage(), 800);

        let evicted = lru.insert("c".to_string(), (), 300);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "a");
        assert_eq!(evicted[0].cost, 400);
        assert_eq!(lru.usage(), 700);

        // growing an existing entry evicts others first
        let evicted = lru.insert("c".to_string(), (), 900);
        assert_eq!(evicted.iter().map(|e| e.key.as_str()).collect_vec(), vec!["b"]);
        assert_eq!(lru.usage(), 900);
        assert!(lru.usage() <= 1000);
    }

    #[test]
    fn test_lru_oversized_entry() {
        let mut lru = Lru::new(LruConfig::default().with_total_cost_limit(10));

        lru.insert("a".to_string(), (), 5);
        let evicted = lru.insert("huge".to_string(), (), 11);
        assert_eq!(evicted.iter().map(|e| e.key.as_str()).collect_vec(), vec!["a", "huge"]);
        assert!(lru.is_empty());
        assert_eq!(lru.usage(), 0);
    }

    #[test]
    fn test_lru_insert_cold() {
        let mut lru = Lru::new(LruConfig::default().with_count_limit(3).with_total_cost_limit(10));

        lru.insert("a".to_string(), 1, 1);
        lru.insert("b".to_string(), 2, 1);
        assert!(!lru.insert_cold("a".to_string(), 10, 1));
        assert_eq!(lru.peek("a"), Some(&1));

        // Cold entries go to the least recently used end.
        assert!(lru.insert_cold("c".to_string(), 3, 1));
        assert_eq!(dump(&lru), keys(&["c", "a", "b"]));

        // Full, nothing is evicted to make room.
        assert!(!lru.insert_cold("d".to_string(), 4, 1));
        assert_eq!(dump(&lru), keys(&["c", "a", "b"]));

        lru.remove("c");
        assert!(!lru.insert_cold("e".to_string(), 5, 9));
        assert!(lru.insert_cold("e".to_string(), 5, 8));
        assert_eq!(lru.usage(), 10);
        assert_eq!(dump(&lru), keys(&["e", "a", "b"]));

        // The next eviction takes the cold entry first.
        let evicted = lru.insert("f".to_string(), 6, 1);
        assert_eq!(evicted.iter().map(|e| e.key.as_str()).collect_vec(), vec!["e"]);
    }

    #[test]
    fn test_lru_insert_cold_into_empty() {
        let mut lru = Lru::new(LruConfig::default());
        assert!(lru.insert_cold("a".to_string(), 1, 1));
        assert!(lru.insert_cold("b".to_string(), 2, 1));
        assert_eq!(dump(&lru), keys(&["b", "a"]));
        lru.get("b");
        assert_eq!(dump(&lru), keys(&["a", "b"]));
    }

    #[test]
    fn test_lru_update_limits() {
        let mut lru = Lru::new(LruConfig::default());
        for i in 0..10 {
            lru.insert(i.to_string(), i, 1);
        }
        let evicted = lru.update(LruConfig::default().with_count_limit(3));
        assert_eq!(evicted.len(), 7);
        assert_eq!(dump(&lru), keys(&["7", "8", "9"]));
    }
}
