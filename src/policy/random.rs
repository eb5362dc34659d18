//! Random replacement policy.
//!
//! Victims are drawn uniformly at random. There is no access tracking, so
//! `get` only extends the entry's deadline.
//!
//! ## Architecture
//!
//! ```text
//!   index: IncrementalHashTable<K, Slot { pos, value, expires_at }>
//!   keys:  Vec<K> (dense, one per resident entry)
//!
//!   ┌──────────┬──────────────┐          ┌─────┬─────┬─────┬─────┐
//!   │   Key    │ Slot.pos     │          │  0  │  1  │  2  │  3  │
//!   ├──────────┼──────────────┤          ├─────┼─────┼─────┼─────┤
//!   │  "A"     │  0           │────┐     │  A  │  B  │  C  │  D  │
//!   │  "B"     │  1           │────┼────►└─────┴─────┴─────┴─────┘
//!   └──────────┴──────────────┘
//!
//!   evict(): i = rng.random_range(0..len)
//!            keys.swap_remove(i); moved key's Slot.pos = i
//! ```
//!
//! Both `remove` and `evict` use the same swap-remove, so the key array
//! stays compact and every operation is O(1) average.
//!
//! Randomness comes from [`SmallRng`]; [`RandomCache::with_seed`] gives a
//! reproducible eviction sequence for tests.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ds::PRESIZE_LIMIT;
use crate::ds::incremental_table::IncrementalHashTable;
use crate::error::{InvariantError, ensure};
use crate::traits::EvictionPolicy;
use crate::ttl::{Expiry, is_expired};

struct Slot<V> {
    pos: usize,
    value: V,
    expires_at: Instant,
}

/// Single-threaded random-eviction cache with TTL.
pub struct RandomCache<K, V> {
    keys: Vec<K>,
    index: IncrementalHashTable<K, Slot<V>>,
    rng: SmallRng,
    capacity: usize,
    expiry: Expiry,
}

impl<K, V> RandomCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache seeded from the operating system.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_rng(capacity, ttl, SmallRng::from_os_rng())
    }

    /// Creates a cache whose eviction sequence is fixed by `seed`.
    pub fn with_seed(capacity: usize, ttl: Duration, seed: u64) -> Self {
        Self::with_rng(capacity, ttl, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, ttl: Duration, rng: SmallRng) -> Self {
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            keys: Vec::with_capacity(capacity.min(PRESIZE_LIMIT)),
            index,
            rng,
            capacity,
            expiry: Expiry::new(ttl),
        }
    }

    /// Resident keys in array order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Swap-removes the key at `pos`, returning its slot.
    fn remove_at(&mut self, pos: usize) -> Option<Slot<V>> {
        if pos >= self.keys.len() {
            return None;
        }
        let key = self.keys.swap_remove(pos);
        if let Some(moved) = self.keys.get(pos)
            && let Some(slot) = self.index.get_mut(moved)
        {
            slot.pos = pos;
        }
        self.index.remove(&key)
    }
}

impl<K, V> EvictionPolicy<K, V> for RandomCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn put(&mut self, key: K, value: V) {
        let expires_at = self.expiry.deadline(Instant::now());
        if let Some(slot) = self.index.get_mut(&key) {
            slot.value = value;
            slot.expires_at = expires_at;
            return;
        }

        let pos = self.keys.len();
        self.keys.push(key.clone());
        self.index.insert_or_assign(
            key,
            Slot {
                pos,
                value,
                expires_at,
            },
        );
    }

    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let slot = self.index.get(key)?;
        if is_expired(slot.expires_at, now) {
            let pos = slot.pos;
            self.remove_at(pos);
            return None;
        }

        let slot = self.index.get_mut(key)?;
        slot.expires_at = self.expiry.deadline(now);
        Some(&slot.value)
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let pos = self.index.peek(key)?.pos;
        self.remove_at(pos).map(|slot| slot.value)
    }

    fn evict(&mut self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        let victim = self.rng.random_range(0..self.keys.len());
        usize::from(self.remove_at(victim).is_some())
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .peek(key)
            .is_some_and(|slot| !is_expired(slot.expires_at, Instant::now()))
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn ttl(&self) -> Duration {
        self.expiry.ttl()
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.index.clear();
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.index.check_invariants()?;
        ensure(self.keys.len() == self.index.len(), || {
            format!("random: {} keys but index has {}", self.keys.len(), self.index.len())
        })?;
        for (pos, key) in self.keys.iter().enumerate() {
            let slot = self
                .index
                .peek(key)
                .ok_or_else(|| InvariantError::new(format!("random: key at {pos} missing from index")))?;
            ensure(slot.pos == pos, || {
                format!("random: key at {pos} records position {}", slot.pos)
            })?;
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for RandomCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomCache")
            .field("len", &self.keys.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.expiry.ttl())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    const LONG: Duration = Duration::from_secs(3600);

    mod basic_behavior {
        use super::*;

        #[test]
        fn new_cache_is_empty() {
            let cache: RandomCache<u32, u32> = RandomCache::new(10, LONG);
            assert!(cache.is_empty());
            assert_eq!(cache.capacity(), 10);
        }

        #[test]
        fn put_get_update() {
            let mut cache = RandomCache::new(10, LONG);
            cache.put("a", 1);
            cache.put("a", 2);
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.get(&"a"), Some(&2));
            assert_eq!(cache.get(&"b"), None);
        }

        #[test]
        fn put_never_evicts() {
            let mut cache = RandomCache::new(2, LONG);
            for i in 0..5 {
                cache.put(i, i);
            }
            assert_eq!(cache.len(), 5);
            assert!(cache.needs_eviction());
        }

        #[test]
        fn remove_swaps_last_into_hole() {
            let mut cache = RandomCache::new(10, LONG);
            for key in ["a", "b", "c", "d"] {
                cache.put(key, ());
            }
            assert_eq!(cache.remove(&"b"), Some(()));
            assert_eq!(cache.keys(), &["a", "d", "c"]);
            assert_eq!(cache.remove(&"b"), None);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn expired_entry_misses() {
            let mut cache = RandomCache::new(4, Duration::from_millis(20));
            cache.put(1, 1);
            cache.put(2, 2);
            thread::sleep(Duration::from_millis(40));
            assert!(!cache.contains(&1));
            assert_eq!(cache.get(&1), None);
            assert_eq!(cache.len(), 1);
            cache.check_invariants().unwrap();
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn reclamation_reaches_capacity() {
            let mut cache = RandomCache::new(5, LONG);
            for i in 0..50 {
                cache.put(i, i);
            }
            while cache.needs_eviction() {
                assert_eq!(cache.evict(), 1);
            }
            assert_eq!(cache.len(), 5);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn evict_on_empty_cache_is_noop() {
            let mut cache: RandomCache<u32, u32> = RandomCache::new(1, LONG);
            assert_eq!(cache.evict(), 0);
        }

        #[test]
        fn same_seed_same_victims() {
            let run = |seed| {
                let mut cache = RandomCache::with_seed(4, LONG, seed);
                for i in 0..20u32 {
                    cache.put(i, i);
                }
                while cache.needs_eviction() {
                    cache.evict();
                }
                let mut left = cache.keys().to_vec();
                left.sort_unstable();
                left
            };
            assert_eq!(run(7), run(7));
        }

        #[test]
        fn victims_are_spread_over_keys() {
            let mut seen = HashSet::new();
            for seed in 0..64 {
                let mut cache = RandomCache::with_seed(3, LONG, seed);
                for i in 0..4u32 {
                    cache.put(i, i);
                }
                cache.evict();
                let survivors: HashSet<_> = cache.keys().iter().copied().collect();
                seen.extend((0..4u32).filter(|k| !survivors.contains(k)));
            }
            // every key gets picked for some seed
            assert_eq!(seen.len(), 4);
        }
    }
}
