//! Adaptive Replacement Cache (ARC) policy.
//!
//! Balances recency against frequency with two resident lists and two ghost
//! lists, steered by a target size `p` for T1 that moves on every ghost hit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          ArcCache<K, V>                              │
//! │                                                                      │
//! │   index: IncrementalHashTable<K, SlotId>                             │
//! │   arena: ListArena<Entry { key, value, expires_at, list: T1 | T2 }>  │
//! │                                                                      │
//! │   T1 (seen once)                     T2 (seen at least twice)        │
//! │   head ─► [x] ◄──► [y] ◄─ tail       head ─► [u] ◄──► [v] ◄─ tail    │
//! │     MRU              LRU               MRU              LRU          │
//! │                       │                                  │           │
//! │                replace│                           replace│           │
//! │                       ▼                                  ▼           │
//! │   B1: GhostList<K> (keys evicted from T1)   B2: GhostList<K> (T2)    │
//! │                                                                      │
//! │   p: target |T1|, 0 ≤ p ≤ capacity, starts at 0                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flows
//!
//! ```text
//!   get(k)       T1 hit → move to T2 head     T2 hit → T2 head
//!   put(k) resident       update value, then as get
//!   put(k) in B1          p += max(1, |B2|/|B1|) (≤ capacity), drop from B1,
//!                         replace(), insert at T2 head
//!   put(k) in B2          p -= max(1, |B1|/|B2|) (≥ 0), drop from B2,
//!                         replace(), insert at T2 head
//!   put(k) cold miss      |T1|+|T2| ≥ capacity → replace(); insert at T1 head
//!
//!   replace():  T1 non-empty and (|T1| > p or (k in B2 and |T1| == p))
//!                  → T1 tail to B1
//!               else T2 tail to B2 (T1 tail to B1 if T2 is empty)
//! ```
//!
//! Ghost lists are bounded by `capacity` and drop their oldest key first.
//! A key is never resident and ghost at the same time.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::ds::ghost_list::GhostList;
use crate::ds::PRESIZE_LIMIT;
use crate::ds::incremental_table::IncrementalHashTable;
use crate::ds::intrusive_list::{IntrusiveList, ListArena};
use crate::ds::slot_arena::SlotId;
use crate::error::{InvariantError, ensure};
use crate::traits::EvictionPolicy;
use crate::ttl::{Expiry, is_expired};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    T1,
    T2,
}

struct Entry<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    segment: Segment,
}

/// Single-threaded ARC cache with TTL.
pub struct ArcCache<K, V> {
    arena: ListArena<Entry<K, V>>,
    t1: IntrusiveList,
    t2: IntrusiveList,
    b1: GhostList<K>,
    b2: GhostList<K>,
    index: IncrementalHashTable<K, SlotId>,
    p: usize,
    capacity: usize,
    expiry: Expiry,
}

impl<K, V> ArcCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            arena: ListArena::with_capacity(capacity.min(PRESIZE_LIMIT)),
            t1: IntrusiveList::new(),
            t2: IntrusiveList::new(),
            b1: GhostList::new(capacity),
            b2: GhostList::new(capacity),
            index,
            p: 0,
            capacity,
            expiry: Expiry::new(ttl),
        }
    }

    /// Current target size of T1.
    pub fn p(&self) -> usize {
        self.p
    }

    pub fn t1_len(&self) -> usize {
        self.t1.len()
    }

    pub fn t2_len(&self) -> usize {
        self.t2.len()
    }

    pub fn b1_len(&self) -> usize {
        self.b1.len()
    }

    pub fn b2_len(&self) -> usize {
        self.b2.len()
    }

    pub fn in_t1<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.segment_of(key) == Some(Segment::T1)
    }

    pub fn in_t2<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.segment_of(key) == Some(Segment::T2)
    }

    pub fn in_b1<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.b1.contains(key)
    }

    pub fn in_b2<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.b2.contains(key)
    }

    fn segment_of<Q>(&self, key: &Q) -> Option<Segment>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = *self.index.peek(key)?;
        self.arena.get(id).map(|entry| entry.segment)
    }

    /// Moves a resident entry to the head of T2.
    fn promote(&mut self, id: SlotId) {
        let Some(entry) = self.arena.get_mut(id) else {
            return;
        };
        match entry.segment {
            Segment::T1 => {
                entry.segment = Segment::T2;
                self.arena.transfer_front(&mut self.t1, &mut self.t2, id);
            },
            Segment::T2 => {
                self.arena.move_to_front(&mut self.t2, id);
            },
        }
    }

    fn insert_resident(&mut self, key: K, value: V, segment: Segment) {
        let entry = Entry {
            key: key.clone(),
            value,
            expires_at: self.expiry.deadline(Instant::now()),
            segment,
        };
        let list = match segment {
            Segment::T1 => &mut self.t1,
            Segment::T2 => &mut self.t2,
        };
        let id = self.arena.push_front(list, entry);
        self.index.insert_or_assign(key, id);
    }

    /// Demotes one resident entry into a ghost list.
    fn replace(&mut self, key_in_b2: bool) -> bool {
        let t1_len = self.t1.len();
        if t1_len > 0 && (t1_len > self.p || (key_in_b2 && t1_len == self.p)) {
            self.demote_t1()
        } else if !self.t2.is_empty() {
            self.demote_t2()
        } else {
            self.demote_t1()
        }
    }

    fn demote_t1(&mut self) -> bool {
        match self.arena.pop_back(&mut self.t1) {
            Some(entry) => {
                self.index.erase(&entry.key);
                self.b1.record(entry.key);
                true
            },
            None => false,
        }
    }

    fn demote_t2(&mut self) -> bool {
        match self.arena.pop_back(&mut self.t2) {
            Some(entry) => {
                self.index.erase(&entry.key);
                self.b2.record(entry.key);
                true
            },
            None => false,
        }
    }

    fn remove_slot(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        let list = match self.arena.get(id)?.segment {
            Segment::T1 => &mut self.t1,
            Segment::T2 => &mut self.t2,
        };
        let entry = self.arena.remove(list, id)?;
        self.index.erase(&entry.key);
        Some(entry)
    }
}

impl<K, V> EvictionPolicy<K, V> for ArcCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn put(&mut self, key: K, value: V) {
        if let Some(&id) = self.index.get(&key) {
            let expires_at = self.expiry.deadline(Instant::now());
            if let Some(entry) = self.arena.get_mut(id) {
                entry.value = value;
                entry.expires_at = expires_at;
            }
            self.promote(id);
            return;
        }

        if self.b1.contains(&key) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = self.p.saturating_add(delta).min(self.capacity);
            self.b1.remove(&key);
            self.replace(false);
            self.insert_resident(key, value, Segment::T2);
            return;
        }

        if self.b2.contains(&key) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            self.b2.remove(&key);
            self.replace(true);
            self.insert_resident(key, value, Segment::T2);
            return;
        }

        if self.t1.len() + self.t2.len() >= self.capacity {
            self.replace(false);
        }
        self.insert_resident(key, value, Segment::T1);
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

        self.promote(id);
        let entry = self.arena.get_mut(id)?;
        entry.expires_at = self.expiry.deadline(now);
        Some(&entry.value)
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = *self.index.peek(key)?;
        self.remove_slot(id).map(|entry| entry.value)
    }

    fn evict(&mut self) -> usize {
        let demoted = if self.t1.is_empty() {
            self.demote_t2()
        } else {
            self.demote_t1()
        };
        usize::from(demoted)
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .peek(key)
            .and_then(|&id| self.arena.get(id))
            .is_some_and(|entry| !is_expired(entry.expires_at, Instant::now()))
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
        self.t1 = IntrusiveList::new();
        self.t2 = IntrusiveList::new();
        self.b1.clear();
        self.b2.clear();
        self.index.clear();
        self.p = 0;
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.arena.check_list(&self.t1, "arc t1")?;
        self.arena.check_list(&self.t2, "arc t2")?;
        self.b1.check_invariants()?;
        self.b2.check_invariants()?;
        self.index.check_invariants()?;

        ensure(self.p <= self.capacity, || {
            format!("arc: p = {} above capacity {}", self.p, self.capacity)
        })?;
        ensure(self.t1.len() + self.t2.len() == self.arena.len(), || {
            format!(
                "arc: |T1|+|T2| = {} but arena has {}",
                self.t1.len() + self.t2.len(),
                self.arena.len()
            )
        })?;
        ensure(self.index.len() == self.arena.len(), || {
            format!("arc: index has {} keys, arena has {}", self.index.len(), self.arena.len())
        })?;

        for (segment, list) in [(Segment::T1, &self.t1), (Segment::T2, &self.t2)] {
            for (id, entry) in self.arena.iter(list) {
                ensure(entry.segment == segment, || {
                    format!("arc: entry in {segment:?} tagged {:?}", entry.segment)
                })?;
                ensure(self.index.peek(&entry.key) == Some(&id), || {
                    format!("arc: index handle for slot {} is stale", id.index())
                })?;
            }
        }

        for key in self.b1.iter() {
            ensure(!self.index.contains(key), || "arc: key resident and in B1".to_string())?;
            ensure(!self.b2.contains(key), || "arc: key in both B1 and B2".to_string())?;
        }
        for key in self.b2.iter() {
            ensure(!self.index.contains(key), || "arc: key resident and in B2".to_string())?;
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for ArcCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArcCache")
            .field("capacity", &self.capacity)
            .field("p", &self.p)
            .field("t1", &self.t1.len())
            .field("t2", &self.t2.len())
            .field("b1", &self.b1.len())
            .field("b2", &self.b2.len())
            .finish_non_exhaustive()
    }
}
