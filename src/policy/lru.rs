//! # Least Recently Used (LRU) Policy
//!
//! Recency-ordered cache with per-entry TTL. Entries live in a
//! [`ListArena`]; the [`IncrementalHashTable`] index maps each key to the
//! `SlotId` of its node, and a single [`IntrusiveList`] orders the nodes from
//! most to least recently used.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                        LruCache<K, V>                            │
//!   │                                                                  │
//!   │   index: IncrementalHashTable<K, SlotId>                         │
//!   │   ┌─────────┬────────┐                                           │
//!   │   │  key_1  │  id_1  │──┐                                        │
//!   │   │  key_2  │  id_2  │──┼──┐                                     │
//!   │   │  key_3  │  id_3  │──┼──┼──┐                                  │
//!   │   └─────────┴────────┘  ▼  ▼  ▼                                  │
//!   │   order:  head ──► [id_1] ◄──► [id_2] ◄──► [id_3] ◄── tail       │
//!   │                     MRU                      LRU                 │
//!   │                                                                  │
//!   │   arena node: Entry { key, value, expires_at }                   │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations Flow
//!
//! ```text
//!   put(D) on a full cache (capacity = 3)
//!     head ──► [A] ◄──► [B] ◄──► [C] ◄── tail
//!     head ──► [D] ◄──► [A] ◄──► [B] ◄──► [C] ◄── tail   (len 4, nothing evicted)
//!
//!   evict()  (reclamation)
//!     1. pop tail entries while expired
//!     2. still over capacity → pop one more live tail entry
//!     head ──► [D] ◄──► [A] ◄──► [B] ◄── tail
//!
//!   get(B)
//!     head ──► [B] ◄──► [D] ◄──► [A] ◄── tail            (deadline = now + ttl)
//! ```
//!
//! `put` never evicts. Overflow is cleared by the storage layer's
//! reclamation loop, which calls [`evict`](EvictionPolicy::evict) while
//! [`needs_eviction`](EvictionPolicy::needs_eviction) holds.
//!
//! LRU is the only policy that removes expired entries proactively: its tail
//! holds the entries touched longest ago, which are also the ones whose
//! deadlines pass first.
//!
//! ## Performance
//!
//! | Operation | Time     |
//! |-----------|----------|
//! | `put`     | O(1) avg |
//! | `get`     | O(1) avg |
//! | `remove`  | O(1) avg |
//! | `evict`   | O(1) amortized per removed entry |

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::ds::PRESIZE_LIMIT;
use crate::ds::incremental_table::IncrementalHashTable;
use crate::ds::intrusive_list::{IntrusiveList, ListArena};
use crate::ds::slot_arena::SlotId;
use crate::error::{InvariantError, ensure};
use crate::traits::EvictionPolicy;
use crate::ttl::{Expiry, is_expired};

struct Entry<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
}

/// Single-threaded LRU cache with TTL.
pub struct LruCache<K, V> {
    arena: ListArena<Entry<K, V>>,
    order: IntrusiveList,
    index: IncrementalHashTable<K, SlotId>,
    capacity: usize,
    expiry: Expiry,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an LRU cache targeting `capacity` entries with the given TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            arena: ListArena::with_capacity(capacity.min(PRESIZE_LIMIT)),
            order: IntrusiveList::new(),
            index,
            capacity,
            expiry: Expiry::new(ttl),
        }
    }

    /// Looks up `key` without touching recency or the deadline.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = *self.index.peek(key)?;
        let entry = self.arena.get(id)?;
        (!is_expired(entry.expires_at, Instant::now())).then_some(&entry.value)
    }

    /// Least recently used entry, expired or not.
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        let entry = self.arena.get(self.order.back()?)?;
        Some((&entry.key, &entry.value))
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.arena
            .iter(&self.order)
            .map(|(_, entry)| (&entry.key, &entry.value))
    }

    fn remove_slot(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        let entry = self.arena.remove(&mut self.order, id)?;
        self.index.erase(&entry.key);
        Some(entry)
    }

    fn tail_expired(&self, now: Instant) -> Option<SlotId> {
        let id = self.order.back()?;
        let entry = self.arena.get(id)?;
        is_expired(entry.expires_at, now).then_some(id)
    }
}

impl<K, V> EvictionPolicy<K, V> for LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn put(&mut self, key: K, value: V) {
        let expires_at = self.expiry.deadline(Instant::now());

        if let Some(&id) = self.index.get(&key) {
            if let Some(entry) = self.arena.get_mut(id) {
                entry.value = value;
                entry.expires_at = expires_at;
            }
            self.arena.move_to_front(&mut self.order, id);
            return;
        }

        let id = self.arena.push_front(
            &mut self.order,
            Entry {
                key: key.clone(),
                value,
                expires_at,
            },
        );
        self.index.insert_or_assign(key, id);
    }

    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let id = *self.index.get(key)?;
        if is_expired(self.arena.get(id)?.expires_at, now) {
            self.remove_slot(id);
            return None;
        }

        self.arena.move_to_front(&mut self.order, id);
        let entry = self.arena.get_mut(id)?;
        entry.expires_at = self.expiry.deadline(now);
        Some(&entry.value)
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = self.index.remove(key)?;
        self.arena.remove(&mut self.order, id).map(|entry| entry.value)
    }

    fn evict(&mut self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        while let Some(id) = self.tail_expired(now) {
            self.remove_slot(id);
            removed += 1;
        }

        if self.arena.len() > self.capacity
            && let Some(id) = self.order.back()
            && self.remove_slot(id).is_some()
        {
            removed += 1;
        }
        removed
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.peek(key).is_some()
    }

    fn len(&self) -> usize {
        self.arena.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn ttl(&self) -> Duration {
        self.expiry.ttl()
    }

    fn clear(&mut self) {
        self.arena.clear();
        self.order = IntrusiveList::new();
        self.index.clear();
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.arena.check_list(&self.order, "lru")?;
        self.index.check_invariants()?;
        ensure(self.order.len() == self.arena.len(), || {
            format!("lru: list has {} nodes, arena has {}", self.order.len(), self.arena.len())
        })?;
        ensure(self.index.len() == self.arena.len(), || {
            format!("lru: index has {} keys, arena has {}", self.index.len(), self.arena.len())
        })?;
        for (id, entry) in self.arena.iter(&self.order) {
            ensure(self.index.peek(&entry.key) == Some(&id), || {
                format!("lru: index handle for slot {} is stale", id.index())
            })?;
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.arena.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.expiry.ttl())
            .finish_non_exhaustive()
    }
}
