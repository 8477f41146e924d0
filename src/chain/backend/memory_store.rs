// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type Store<K, V> = RwLock<HashMap<K, V>>;

/// Concurrent hash map split in one shard per core.
#[derive(Debug, Clone)]
pub struct MemoryStore<K, V: Clone> {
    shards: Arc<Vec<Store<K, V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> MemoryStore<K, V> {
    pub fn new() -> Self {
        let mut shards = Vec::new();

        for _ in 0..num_cpus::get().max(1) {
            shards.push(RwLock::new(HashMap::new()));
        }

        Self {
            shards: Arc::new(shards),
        }
    }

    fn shard_idx(&self, k: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        k.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    pub fn get(&self, k: &K) -> Option<V> {
        self.shards[self.shard_idx(k)].read().get(k).cloned()
    }

    pub fn put(&self, k: K, v: V) -> Option<V> {
        self.shards[self.shard_idx(&k)].write().insert(k, v)
    }

    pub fn delete(&self, k: &K) -> Option<V> {
        self.shards[self.shard_idx(k)].write().remove(k)
    }

    /// Clones every entry matching `f`
    pub fn filter<F: Fn(&K) -> bool>(&self, f: F) -> Vec<(K, V)> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .filter(|(k, _)| f(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Applies all writes while holding every shard lock so readers never
    /// observe a partially applied batch.
    pub fn apply_batch(&self, ops: Vec<(K, Option<V>)>) {
        let mut guards: Vec<RwLockWriteGuard<'_, HashMap<K, V>>> =
            self.shards.iter().map(|s| s.write()).collect();

        for (k, v) in ops {
            let idx = self.shard_idx(&k);
            match v {
                Some(v) => {
                    guards[idx].insert(k, v);
                }
                None => {
                    guards[idx].remove(&k);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_puts_gets_and_deletes() {
        let store: MemoryStore<Vec<u8>, u32> = MemoryStore::new();
        assert_eq!(store.put(vec![1], 1), None);
        assert_eq!(store.put(vec![1], 2), Some(1));
        assert_eq!(store.get(&vec![1]), Some(2));
        assert_eq!(store.delete(&vec![1]), Some(2));
        assert!(store.is_empty());
    }

    #[test]
    fn it_applies_batches() {
        let store: MemoryStore<u32, u32> = MemoryStore::new();
        store.put(5, 5);
        store.apply_batch((0..100).map(|i| (i, Some(i * 2))).chain([(5, None)]).collect());
        assert_eq!(store.len(), 99);
        assert_eq!(store.get(&10), Some(20));
        assert_eq!(store.get(&5), None);
        assert_eq!(store.filter(|k| *k < 3).len(), 3);
    }
}
