// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded least-frequently-used cache.
//!
//! When an insertion would exceed the capacity, the least frequently used
//! half of the entries is evicted at once. Ties are broken by insertion
//! order, oldest first, so eviction is deterministic.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    hits: u64,
    seq: u64,
}

#[derive(Debug)]
pub struct LfuCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    next_seq: u64,
}

impl<K, V> LfuCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks `key` up, counting a hit when present.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get_mut(key).map(|slot| {
            slot.hits += 1;
            slot.value.clone()
        })
    }

    /// Returns the cached value or computes, stores and returns a new one.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce(&K) -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        if self.entries.len() >= self.capacity {
            self.evict_half();
        }
        let value = make(&key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Slot {
                value: value.clone(),
                hits: 1,
                seq,
            },
        );
        value
    }

    fn evict_half(&mut self) {
        let mut ranked: Vec<(u64, u64, K)> = self
            .entries
            .iter()
            .map(|(key, slot)| (slot.hits, slot.seq, key.clone()))
            .collect();
        ranked.sort_unstable_by_key(|(hits, seq, _)| (*hits, *seq));
        let evict = (ranked.len() / 2).max(1);
        for (_, _, key) in ranked.into_iter().take(evict) {
            self.entries.remove(&key);
        }
    }
}
