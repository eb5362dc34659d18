//! Two-Queue (2Q) replacement policy.
//!
//! New keys enter a FIFO probation queue (A1in). A second access promotes
//! them to the main recency queue (Am). Keys pushed out of A1in are kept as
//! ghosts in A1out; a `put` on a ghost key skips probation and lands
//! directly in Am. One-time accesses therefore never displace the hot set.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        TwoQCache<K, V>                             │
//! │                                                                    │
//! │   index: IncrementalHashTable<K, SlotId>                           │
//! │   arena: ListArena<Entry { key, value, expires_at, queue }>        │
//! │                                                                    │
//! │   A1in (FIFO, target kin)            Am (LRU, am_cap)              │
//! │   head ─► [new] ◄──► [old] ◄─ tail   head ─► [hot] ◄──► [cold] ◄─ tail
//! │                         │                                          │
//! │                  replace│                                          │
//! │                         ▼                                          │
//! │   A1out: GhostList<K> (keys only, ≤ capacity)                      │
//! │                                                                    │
//! │   kin = max(1, capacity / 4)      am_cap = capacity - kin          │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flows
//!
//! ```text
//!   put(new)        |A1in|+|Am| ≥ capacity → replace(false); push A1in head
//!   put/get A1in    promote to Am head; |Am| over am_cap → drop Am tail
//!   put/get Am      move to Am head
//!   put(k in A1out) replace(true); drop from A1out; insert at Am head
//!
//!   replace(ghost): |A1in| ≥ kin and (!ghost or |A1in| > kin)
//!                     → A1in tail to A1out
//!                   else Am tail dropped (A1in tail if Am is empty)
//!   evict()       = replace(false)
//! ```
//!
//! The overflow drop after a promotion never takes the entry just promoted,
//! so with `capacity == 1` (`am_cap == 0`) Am may hold that one entry.

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
enum Queue {
    A1in,
    Am,
}

struct Entry<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    queue: Queue,
}

/// Single-threaded 2Q cache with TTL.
pub struct TwoQCache<K, V> {
    arena: ListArena<Entry<K, V>>,
    a1in: IntrusiveList,
    am: IntrusiveList,
    a1out: GhostList<K>,
    index: IncrementalHashTable<K, SlotId>,
    kin: usize,
    am_cap: usize,
    capacity: usize,
    expiry: Expiry,
}

impl<K, V> TwoQCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let kin = (capacity / 4).max(1);
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            arena: ListArena::with_capacity(capacity.min(PRESIZE_LIMIT)),
            a1in: IntrusiveList::new(),
            am: IntrusiveList::new(),
            a1out: GhostList::new(capacity),
            index,
            kin,
            am_cap: capacity.saturating_sub(kin),
            capacity,
            expiry: Expiry::new(ttl),
        }
    }

    /// Target size of the probation queue.
    pub fn kin(&self) -> usize {
        self.kin
    }

    /// Target size of the main queue.
    pub fn am_capacity(&self) -> usize {
        self.am_cap
    }

    pub fn a1in_len(&self) -> usize {
        self.a1in.len()
    }

    pub fn am_len(&self) -> usize {
        self.am.len()
    }

    pub fn a1out_len(&self) -> usize {
        self.a1out.len()
    }

    pub fn in_a1in<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.queue_of(key) == Some(Queue::A1in)
    }

    pub fn in_am<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.queue_of(key) == Some(Queue::Am)
    }

    pub fn in_a1out<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.a1out.contains(key)
    }

    fn queue_of<Q>(&self, key: &Q) -> Option<Queue>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = *self.index.peek(key)?;
        self.arena.get(id).map(|entry| entry.queue)
    }

    /// Handles a hit: A1in entries move to Am, Am entries to its head.
    fn touch(&mut self, id: SlotId) {
        let Some(entry) = self.arena.get_mut(id) else {
            return;
        };
        match entry.queue {
            Queue::Am => {
                self.arena.move_to_front(&mut self.am, id);
            },
            Queue::A1in => {
                entry.queue = Queue::Am;
                self.arena.transfer_front(&mut self.a1in, &mut self.am, id);
                while self.am.len() > self.am_cap.max(1) {
                    match self.arena.pop_back(&mut self.am) {
                        Some(dropped) => {
                            self.index.erase(&dropped.key);
                        },
                        None => break,
                    }
                }
            },
        }
    }

    fn insert_resident(&mut self, key: K, value: V, queue: Queue) {
        let entry = Entry {
            key: key.clone(),
            value,
            expires_at: self.expiry.deadline(Instant::now()),
            queue,
        };
        let list = match queue {
            Queue::A1in => &mut self.a1in,
            Queue::Am => &mut self.am,
        };
        let id = self.arena.push_front(list, entry);
        self.index.insert_or_assign(key, id);
    }

    /// Frees one resident slot; see the module docs for the rule.
    fn replace(&mut self, is_ghost: bool) -> bool {
        let a1in_len = self.a1in.len();
        if a1in_len >= self.kin && (!is_ghost || a1in_len > self.kin) {
            return self.demote_a1in();
        }
        match self.arena.pop_back(&mut self.am) {
            Some(dropped) => {
                self.index.erase(&dropped.key);
                true
            },
            None => self.demote_a1in(),
        }
    }

    fn demote_a1in(&mut self) -> bool {
        match self.arena.pop_back(&mut self.a1in) {
            Some(entry) => {
                self.index.erase(&entry.key);
                self.a1out.record(entry.key);
                true
            },
            None => false,
        }
    }

    fn remove_slot(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        let list = match self.arena.get(id)?.queue {
            Queue::A1in => &mut self.a1in,
            Queue::Am => &mut self.am,
        };
        let entry = self.arena.remove(list, id)?;
        self.index.erase(&entry.key);
        Some(entry)
    }
}

impl<K, V> EvictionPolicy<K, V> for TwoQCache<K, V>
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
            self.touch(id);
            return;
        }

        if self.a1out.contains(&key) {
            self.replace(true);
            self.a1out.remove(&key);
            self.insert_resident(key, value, Queue::Am);
            return;
        }

        if self.a1in.len() + self.am.len() >= self.capacity {
            self.replace(false);
        }
        self.insert_resident(key, value, Queue::A1in);
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

        self.touch(id);
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
        usize::from(self.replace(false))
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
        self.a1in = IntrusiveList::new();
        self.am = IntrusiveList::new();
        self.a1out.clear();
        self.index.clear();
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.arena.check_list(&self.a1in, "2q a1in")?;
        self.arena.check_list(&self.am, "2q am")?;
        self.a1out.check_invariants()?;
        self.index.check_invariants()?;

        ensure(self.a1in.len() + self.am.len() == self.arena.len(), || {
            format!(
                "2q: |A1in|+|Am| = {} but arena has {}",
                self.a1in.len() + self.am.len(),
                self.arena.len()
            )
        })?;
        ensure(self.index.len() == self.arena.len(), || {
            format!("2q: index has {} keys, arena has {}", self.index.len(), self.arena.len())
        })?;

        for (queue, list) in [(Queue::A1in, &self.a1in), (Queue::Am, &self.am)] {
            for (id, entry) in self.arena.iter(list) {
                ensure(entry.queue == queue, || {
                    format!("2q: entry in {queue:?} tagged {:?}", entry.queue)
                })?;
                ensure(self.index.peek(&entry.key) == Some(&id), || {
                    format!("2q: index handle for slot {} is stale", id.index())
                })?;
            }
        }
        for key in self.a1out.iter() {
            ensure(!self.index.contains(key), || "2q: key resident and in A1out".to_string())?;
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for TwoQCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoQCache")
            .field("capacity", &self.capacity)
            .field("kin", &self.kin)
            .field("a1in", &self.a1in.len())
            .field("am", &self.am.len())
            .field("a1out", &self.a1out.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const LONG: Duration = Duration::from_secs(3600);

    #[test]
    fn two_q_sizes_from_capacity() {
        let cache: TwoQCache<u32, u32> = TwoQCache::new(100, LONG);
        assert_eq!(cache.kin(), 25);
        assert_eq!(cache.am_capacity(), 75);

        let small: TwoQCache<u32, u32> = TwoQCache::new(2, LONG);
        assert_eq!(small.kin(), 1);
        assert_eq!(small.am_capacity(), 1);
    }

    #[test]
    fn two_q_new_keys_enter_a1in() {
        let mut cache = TwoQCache::new(4, LONG);
        cache.put("a", 1);
        cache.put("b", 2);
        assert!(cache.in_a1in(&"a"));
        assert_eq!(cache.a1in_len(), 2);
        assert_eq!(cache.am_len(), 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_second_access_promotes_to_am() {
        let mut cache = TwoQCache::new(4, LONG);
        cache.put("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert!(cache.in_am(&"a"));

        cache.put("b", 2);
        cache.put("b", 20);
        assert!(cache.in_am(&"b"));
        assert_eq!(cache.get(&"b"), Some(&20));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_a1in_overflow_goes_to_a1out() {
        let mut cache = TwoQCache::new(4, LONG);
        for key in ["a", "b", "c", "d", "e"] {
            cache.put(key, ());
        }
        // |A1in| = 4 ≥ kin = 1 → oldest probation entry becomes a ghost
        assert_eq!(cache.len(), 4);
        assert!(cache.in_a1out(&"a"));
        assert!(!cache.contains(&"a"));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_ghost_readmission_lands_in_am() {
        let mut cache = TwoQCache::new(4, LONG);
        for key in ["a", "b", "c", "d", "e"] {
            cache.put(key, 0);
        }
        assert!(cache.in_a1out(&"a"));

        cache.put("a", 1);
        assert!(cache.in_am(&"a"));
        assert!(!cache.in_a1out(&"a"));
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_am_overflow_drops_tail_without_ghost() {
        let mut cache = TwoQCache::new(4, LONG); // kin 1, am_cap 3
        for key in 0..4u32 {
            cache.put(key, key);
            cache.get(&key);
        }
        // four promotions into an Am of three: key 0 dropped outright
        assert_eq!(cache.am_len(), 3);
        assert!(!cache.contains(&0));
        assert!(!cache.in_a1out(&0));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_capacity_one_keeps_promoted_entry() {
        let mut cache = TwoQCache::new(1, LONG);
        cache.put("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert!(cache.in_am(&"a"));
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_evict_prefers_a1in_then_am() {
        let mut cache = TwoQCache::new(4, LONG);
        cache.put("hot", 1);
        cache.get(&"hot");
        cache.put("new", 2);

        assert_eq!(cache.evict(), 1);
        assert!(cache.in_a1out(&"new"));
        assert_eq!(cache.evict(), 1);
        assert!(!cache.contains(&"hot"));
        assert_eq!(cache.evict(), 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_remove_and_expiry() {
        let mut cache = TwoQCache::new(4, Duration::from_millis(20));
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"b"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.a1out_len(), 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn two_q_ghost_lookup_by_borrowed_key() {
        let mut cache: TwoQCache<String, u32> = TwoQCache::new(4, LONG);
        for key in ["a", "b", "c", "d", "e"] {
            cache.put(key.to_string(), 0);
        }
        assert!(cache.in_a1out("a"));
        assert!(!cache.in_a1out("e"));
        assert!(format!("{cache:?}").contains("a1out: 1"));
    }

    #[test]
    fn two_q_resident_set_never_exceeds_capacity() {
        let mut cache = TwoQCache::new(8, LONG);
        for i in 0..500u32 {
            let key = (i * 7) % 23;
            if i % 2 == 0 {
                cache.put(key, i);
            } else {
                cache.get(&key);
            }
            assert!(cache.len() <= 8);
        }
        cache.check_invariants().unwrap();
    }
}
