//! # Eviction Policy Contract
//!
//! Every replacement policy in [`crate::policy`] implements
//! [`EvictionPolicy`]. The storage layer never talks to a policy through a
//! trait object; it holds a [`PolicyCache`](crate::builder::PolicyCache) enum
//! and dispatches by `match`. The trait pins down the shared contract so the
//! five implementations cannot drift apart.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │                EvictionPolicy<K, V>                      │
//!   │                                                          │
//!   │  put(&mut, K, V)            insert or overwrite, new TTL  │
//!   │  get(&mut, &Q) → Option<&V> hit refreshes TTL + rank     │
//!   │  remove(&mut, &Q) → Option<V>                            │
//!   │  evict(&mut) → usize        one eviction step            │
//!   │  needs_eviction(&) → bool   over capacity?               │
//!   │  contains(&, &Q) → bool     resident and unexpired       │
//!   │  len / capacity / ttl / clear / check_invariants         │
//!   └─────────────────────────────┬────────────────────────────┘
//!                                 │
//!       ┌──────────┬──────────────┼──────────────┬──────────┐
//!       ▼          ▼              ▼              ▼          ▼
//!    LruCache   LfuCache       ArcCache     TwoQCache   RandomCache
//! ```
//!
//! ## Capacity
//!
//! | Policy | `put` at capacity           | `evict`                               |
//! |--------|-----------------------------|---------------------------------------|
//! | LRU    | grows past capacity         | expired tail entries, then one live   |
//! | LFU    | grows past capacity         | oldest entry of the lowest frequency  |
//! | ARC    | runs `replace()` first      | T1 tail to B1, else T2 tail to B2     |
//! | 2Q     | runs `replace(false)` first | `replace(false)`                      |
//! | Random | grows past capacity         | uniformly random entry                |
//!
//! Policies that grow past capacity rely on the storage layer's reclamation
//! loop calling `evict` while `needs_eviction` holds.
//!
//! ## Thread Safety
//!
//! Implementations are single-threaded. Even `get` takes `&mut self`,
//! because a hit moves the entry and extends its deadline.

use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;

use crate::error::InvariantError;

/// Common contract of the replacement policies.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use shardkv::policy::LruCache;
/// use shardkv::traits::EvictionPolicy;
///
/// fn fill<P: EvictionPolicy<u32, u32>>(policy: &mut P, n: u32) {
///     for i in 0..n {
///         policy.put(i, i * 10);
///     }
///     while policy.needs_eviction() {
///         policy.evict();
///     }
/// }
///
/// let mut lru = LruCache::new(4, Duration::from_secs(60));
/// fill(&mut lru, 10);
/// assert_eq!(lru.len(), 4);
/// assert_eq!(lru.get(&9), Some(&90));
/// ```
pub trait EvictionPolicy<K, V> {
    /// Inserts `key` or overwrites its value; the TTL restarts either way.
    fn put(&mut self, key: K, value: V);

    /// Returns the value when `key` is resident and unexpired.
    ///
    /// A hit refreshes the TTL and updates recency/frequency. An expired
    /// entry is deleted and reported as a miss.
    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Removes `key`, returning its value. Ghost records are left alone.
    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Performs one eviction step; returns how many resident entries left.
    fn evict(&mut self) -> usize;

    /// Returns `true` while more entries are resident than capacity allows.
    fn needs_eviction(&self) -> bool {
        self.len() > self.capacity()
    }

    /// Returns `true` if `key` is resident and unexpired. Does not touch state.
    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Resident entries, including expired ones not yet collected.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    fn ttl(&self) -> Duration;

    /// Drops every entry and ghost record.
    fn clear(&mut self);

    /// Verifies the policy's internal structures agree with each other.
    fn check_invariants(&self) -> Result<(), InvariantError>;
}
