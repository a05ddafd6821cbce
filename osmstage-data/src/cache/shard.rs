//! Hash map split across independently locked shards.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards per map.
pub(crate) const SHARD_COUNT: usize = 64;

/// A map whose keys are spread over [`SHARD_COUNT`] read/write locks.
///
/// Readers of one shard never block writers of another, so workers that
/// touch unrelated ids proceed in parallel. Writes replace whole values, so
/// a poisoned shard is recovered rather than propagated.
#[derive(Debug)]
pub(crate) struct ShardedMap<K, V> {
    shards: [RwLock<HashMap<K, V>>; SHARD_COUNT],
    hasher: RandomState,
}

impl<K, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self {
            shards: std::array::from_fn(|_| RwLock::default()),
            hasher: RandomState::new(),
        }
    }
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let [first, ..] = &self.shards;
        let slot = self.hasher.hash_one(key) % SHARD_COUNT as u64;
        usize::try_from(slot)
            .ok()
            .and_then(|idx| self.shards.get(idx))
            .unwrap_or(first)
    }

    pub(crate) fn read(&self, key: &K) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.shard(key).read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self, key: &K) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.shard(key).write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.read(key).contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Visit every entry, one shard at a time.
    pub(crate) fn for_each(&self, mut visit: impl FnMut(&K, &V)) {
        for shard in &self.shards {
            let guard = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in guard.iter() {
                visit(key, value);
            }
        }
    }
}

impl<K: Hash + Eq, V: Clone> ShardedMap<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.read(key).get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_inserts_land_in_one_map() {
        let map = ShardedMap::<i64, i64>::default();
        (0..10_000_i64).into_par_iter().for_each(|id| {
            map.write(&id).insert(id, id * 2);
        });
        assert_eq!(map.len(), 10_000);
        assert_eq!(map.get(&4_321), Some(8_642));
        assert_eq!(map.write(&4_321).remove(&4_321), Some(8_642));
        assert!(!map.contains_key(&4_321));
    }

    #[test]
    fn for_each_visits_every_entry() {
        let map = ShardedMap::<i64, ()>::default();
        for id in 0..100 {
            map.write(&id).insert(id, ());
        }
        let mut seen = Vec::new();
        map.for_each(|id, _| seen.push(*id));
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
