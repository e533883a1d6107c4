// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A thread-safe, bounded, LRU + idle-timeout cache: [`BoundedMap`].
//!
//! Two containers share ownership of each entry conceptually (a hash
//! index and a recency queue); here both live in a single arena
//! (`Vec<Option<Node<K, V>>>`) addressed by index, linked into a
//! doubly-linked recency list, so no unsafe pointer juggling is needed
//! to keep the two views consistent.

mod stats;

pub use stats::{BoundedMapStats, StatsSnapshot};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Computes the "size" an entry counts against the map's bound.
pub trait SizePolicy<K, V> {
    fn size_of(&self, key: &K, value: &V) -> usize;
}

/// The default policy: every entry counts as `1`, so `bound` becomes a
/// plain entry-count limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSizePolicy;

impl<K, V> SizePolicy<K, V> for DefaultSizePolicy {
    fn size_of(&self, _key: &K, _value: &V) -> usize {
        1
    }
}

impl<K, V, F> SizePolicy<K, V> for F
where
    F: Fn(&K, &V) -> usize,
{
    fn size_of(&self, key: &K, value: &V) -> usize {
        self(key, value)
    }
}

struct Node<K, V> {
    key: K,
    value: V,
    size: usize,
    last_used: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    /// most-recently-used end
    mru: Option<usize>,
    /// least-recently-used end
    lru: Option<usize>,
    total_size: usize,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            mru: None,
            lru: None,
            total_size: 0,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.mru = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.lru = prev,
        }
    }

    fn push_mru(&mut self, idx: usize) {
        let old_mru = self.mru;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_mru;
        }
        if let Some(old) = old_mru {
            self.nodes[old].as_mut().unwrap().prev = Some(idx);
        }
        self.mru = Some(idx);
        if self.lru.is_none() {
            self.lru = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize, now: Instant) {
        if self.mru == Some(idx) {
            self.nodes[idx].as_mut().unwrap().last_used = now;
            return;
        }
        self.detach(idx);
        self.nodes[idx].as_mut().unwrap().last_used = now;
        self.push_mru(idx);
    }

    fn remove_node(&mut self, idx: usize) -> Node<K, V> {
        self.detach(idx);
        let node = self.nodes[idx].take().unwrap();
        self.index.remove(&node.key);
        self.total_size -= node.size;
        self.free.push(idx);
        node
    }

    fn insert_node(&mut self, key: K, value: V, size: usize, now: Instant) -> usize {
        let node = Node {
            key: key.clone(),
            value,
            size,
            last_used: now,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.total_size += size;
        self.push_mru(idx);
        idx
    }
}

/// A thread-safe LRU cache bounded by a caller-defined size budget,
/// where only entries idle for at least `timeout` are eligible for
/// eviction.
pub struct BoundedMap<K, V, S = DefaultSizePolicy> {
    inner: Mutex<Inner<K, V>>,
    bound: usize,
    timeout: Duration,
    size_policy: S,
    stats: BoundedMapStats,
}

impl<K, V> BoundedMap<K, V, DefaultSizePolicy>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(bound: usize, timeout: Duration) -> Self {
        Self::with_size_policy(bound, timeout, DefaultSizePolicy)
    }
}

impl<K, V, S> BoundedMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: SizePolicy<K, V>,
{
    #[must_use]
    pub fn with_size_policy(bound: usize, timeout: Duration, size_policy: S) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            bound,
            timeout,
            size_policy,
            stats: BoundedMapStats::default(),
        }
    }

    #[must_use]
    pub fn bound(&self) -> usize {
        self.bound
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`, marking the entry most-recently-used on a hit.
    ///
    /// Returns an owned clone rather than a reference: the entry can be
    /// concurrently evicted by another thread the instant the lock is
    /// released, so handing back a live reference would be unsound.
    pub fn find(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let idx = *inner.index.get(key)?;
        let now = Instant::now();
        inner.touch(idx, now);
        Some(inner.nodes[idx].as_ref().unwrap().value.clone())
    }

    /// Inserts `(key, value)` if `key` is not already present.
    ///
    /// On success the entry becomes MRU. On failure — either because
    /// the entry alone exceeds `bound`, or because no expired victim
    /// could be evicted to make room — no mutation occurs and `false`
    /// is returned. Both failure modes are reported through the same
    /// `not_inserted` counter, matching the original cache's stats,
    /// which do not distinguish them either.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.index.contains_key(&key) {
            self.stats.insert_existing.fetch_add();
            return false;
        }
        let size = self.size_policy.size_of(&key, &value);
        if !self.admit(&mut inner, size) {
            self.stats.not_inserted.fetch_add();
            return false;
        }
        let now = Instant::now();
        inner.insert_node(key, value, size, now);
        self.stats.inserted_new.fetch_add();
        true
    }

    /// Inserts, replacing any existing value for `key`.
    pub fn insert_or_update(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.index.get(&key) {
            let old_size = inner.nodes[idx].as_ref().unwrap().size;
            let new_size = self.size_policy.size_of(&key, &value);
            let budget_without_old = self.bound_minus(inner.total_size - old_size);
            if new_size > budget_without_old && !self.evict_for(&mut inner, new_size, old_size) {
                self.stats.not_inserted.fetch_add();
                return false;
            }
            let now = Instant::now();
            {
                let node = inner.nodes[idx].as_mut().unwrap();
                inner.total_size = inner.total_size - node.size + new_size;
                node.value = value;
                node.size = new_size;
                node.last_used = now;
            }
            inner.touch(idx, now);
            self.stats.replaced.fetch_add();
            true
        } else {
            drop(inner);
            self.insert(key, value)
        }
    }

    /// Mutates the value stored for `key` via `f`, if present,
    /// recomputing its size afterward. If the new size no longer fits
    /// the bound and no room can be made, the entry is removed instead
    /// (counted as `removed_updated`).
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&idx) = inner.index.get(key) else {
            return false;
        };
        {
            let node = inner.nodes[idx].as_mut().unwrap();
            f(&mut node.value);
        }
        let (new_size, old_size) = {
            let node = inner.nodes[idx].as_ref().unwrap();
            (self.size_policy.size_of(&node.key, &node.value), node.size)
        };
        if new_size > self.bound {
            inner.remove_node(idx);
            self.stats.removed_updated.fetch_add();
            return false;
        }
        let budget_without_old = self.bound_minus(inner.total_size - old_size);
        if new_size > budget_without_old && !self.evict_for(&mut inner, new_size, old_size) {
            inner.remove_node(idx);
            self.stats.removed_updated.fetch_add();
            return false;
        }
        let now = Instant::now();
        {
            let node = inner.nodes[idx].as_mut().unwrap();
            inner.total_size = inner.total_size - node.size + new_size;
            node.size = new_size;
            node.last_used = now;
        }
        inner.touch(idx, now);
        true
    }

    pub fn erase(&self, key: &K) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.index.get(key) {
            inner.remove_node(idx);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::new();
    }

    /// Copies every `(key, value)` pair into `out`, in MRU-to-LRU
    /// order.
    pub fn copy_to(&self, out: &mut Vec<(K, V)>) {
        let inner = self.inner.lock().unwrap();
        let mut cursor = inner.mru;
        while let Some(idx) = cursor {
            let node = inner.nodes[idx].as_ref().unwrap();
            out.push((node.key.clone(), node.value.clone()));
            cursor = node.next;
        }
    }

    fn bound_minus(&self, used: usize) -> usize {
        self.bound.saturating_sub(used)
    }

    /// Admission path for a brand-new entry of size `s`.
    fn admit(&self, inner: &mut Inner<K, V>, s: usize) -> bool {
        if s > self.bound {
            return false;
        }
        let now = Instant::now();
        loop {
            if inner.total_size + s <= self.bound {
                return true;
            }
            let Some(lru_idx) = inner.lru else {
                return false;
            };
            let expired = {
                let node = inner.nodes[lru_idx].as_ref().unwrap();
                node.last_used + self.timeout < now
            };
            if !expired {
                return false;
            }
            inner.remove_node(lru_idx);
            self.stats.removed_outdated.fetch_add();
        }
    }

    /// Like `admit`, but for growing an existing entry (`old_size` is
    /// excluded from the budget check since it is about to be replaced).
    fn evict_for(&self, inner: &mut Inner<K, V>, new_size: usize, old_size: usize) -> bool {
        if new_size > self.bound {
            return false;
        }
        let now = Instant::now();
        loop {
            if inner.total_size - old_size + new_size <= self.bound {
                return true;
            }
            let Some(lru_idx) = inner.lru else {
                return false;
            };
            let expired = {
                let node = inner.nodes[lru_idx].as_ref().unwrap();
                node.last_used + self.timeout < now
            };
            if !expired {
                return false;
            }
            inner.remove_node(lru_idx);
            self.stats.removed_outdated.fetch_add();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_eviction_without_timeout() {
        let map: BoundedMap<char, u32> = BoundedMap::new(3, Duration::ZERO);
        assert!(map.insert('a', 1));
        assert!(map.insert('b', 1));
        assert!(map.insert('c', 1));
        assert!(map.insert('d', 1));
        let mut out = Vec::new();
        map.copy_to(&mut out);
        let keys: Vec<char> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!['d', 'c', 'b']);

        assert_eq!(map.find(&'b'), Some(1));
        assert!(map.insert('e', 1));
        let mut out = Vec::new();
        map.copy_to(&mut out);
        let keys: Vec<char> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!['e', 'b', 'd']);
    }

    #[test]
    fn timeout_shields_recently_used_entries() {
        let map: BoundedMap<char, u32> = BoundedMap::new(2, Duration::from_secs(60));
        assert!(map.insert('a', 1));
        assert!(map.insert('b', 1));
        assert!(!map.insert('c', 1));
        assert_eq!(map.len(), 2);
        let stats = map.stats();
        assert_eq!(stats.not_inserted, 1);
        assert_eq!(stats.removed_outdated, 0);
    }

    #[test]
    fn zero_bound_rejects_everything() {
        let map: BoundedMap<char, u32> = BoundedMap::new(0, Duration::ZERO);
        assert!(!map.insert('a', 1));
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let map: BoundedMap<char, u32> = BoundedMap::new(4, Duration::ZERO);
        assert!(map.insert('a', 1));
        assert!(!map.insert('a', 2));
        assert_eq!(map.find(&'a'), Some(1));
        assert_eq!(map.stats().insert_existing, 1);
    }

    #[test]
    fn erase_then_find_misses() {
        let map: BoundedMap<char, u32> = BoundedMap::new(4, Duration::ZERO);
        map.insert('a', 1);
        assert!(map.erase(&'a'));
        assert_eq!(map.find(&'a'), None);
    }

    #[test]
    fn update_in_place() {
        let map: BoundedMap<char, u32> = BoundedMap::new(4, Duration::ZERO);
        map.insert('a', 1);
        assert!(map.update(&'a', |v| *v += 41));
        assert_eq!(map.find(&'a'), Some(42));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8, u8),
        Find(u8),
        Erase(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<u8>(), any::<u8>()).prop_map(|(k, v)| Op::Insert(k, v)),
            any::<u8>().prop_map(Op::Find),
            any::<u8>().prop_map(Op::Erase),
        ]
    }

    proptest! {
        #[test]
        fn size_budget_and_membership_invariants(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let map: BoundedMap<u8, u8> = BoundedMap::new(16, Duration::ZERO);
            for op in ops {
                match op {
                    Op::Insert(k, v) => { map.insert(k, v); }
                    Op::Find(k) => { map.find(&k); }
                    Op::Erase(k) => { map.erase(&k); }
                }
                let inner = map.inner.lock().unwrap();
                prop_assert!(inner.total_size <= map.bound());
                prop_assert_eq!(inner.index.len(), inner.nodes.iter().filter(|n| n.is_some()).count());
            }
        }
    }
}
