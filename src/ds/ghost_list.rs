//! Bounded recency list of evicted keys.
//!
//! ARC keeps two of these (B1, B2) and 2Q keeps one (A1out). Only keys are
//! stored; a hit tells the policy that a recently evicted key came back.
//!
//! ## Architecture
//!
//! ```text
//!   index: IncrementalHashTable<K, SlotId>    list (ListArena<K>)
//!   ┌─────────┬─────────┐                     head ─► [C] ◄──► [B] ◄──► [A] ◄── tail
//!   │  key A  │  id_1   │                        newest                  oldest
//!   │  key B  │  id_2   │
//!   └─────────┴─────────┘
//! ```
//!
//! ## Behavior
//! - `record(k)`: puts key at the head; trims the oldest when over capacity
//! - `remove(k)`: deletes from list and index
//! - `pop_oldest()`: removes the tail key
//!
//! All operations are O(1) average.

use std::borrow::Borrow;
use std::hash::Hash;

use crate::ds::PRESIZE_LIMIT;
use crate::ds::incremental_table::IncrementalHashTable;
use crate::ds::intrusive_list::{IntrusiveList, ListArena};
use crate::ds::slot_arena::SlotId;
use crate::error::{InvariantError, ensure};

/// Bounded FIFO/recency list of keys (no values).
#[derive(Debug)]
pub struct GhostList<K> {
    arena: ListArena<K>,
    list: IntrusiveList,
    index: IncrementalHashTable<K, SlotId>,
    capacity: usize,
}

impl<K> GhostList<K> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<K> GhostList<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost list holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            arena: ListArena::with_capacity(capacity.min(PRESIZE_LIMIT)),
            list: IntrusiveList::new(),
            index,
            capacity,
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains(key)
    }

    /// Records `key` as the newest ghost, trimming the oldest past capacity.
    pub fn record(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }

        if let Some(&id) = self.index.get(&key) {
            self.arena.move_to_front(&mut self.list, id);
            return;
        }

        while self.list.len() >= self.capacity {
            if self.pop_oldest().is_none() {
                break;
            }
        }

        let id = self.arena.push_front(&mut self.list, key.clone());
        self.index.insert_or_assign(key, id);
    }

    /// Removes `key`; returns `true` if it was a ghost.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.remove(key) {
            Some(id) => {
                self.arena.remove(&mut self.list, id);
                true
            },
            None => false,
        }
    }

    /// Removes and returns the oldest ghost.
    pub fn pop_oldest(&mut self) -> Option<K> {
        let key = self.arena.pop_back(&mut self.list)?;
        self.index.erase(&key);
        Some(key)
    }

    /// Keys from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.arena.iter(&self.list).map(|(_, key)| key)
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.list = IntrusiveList::new();
        self.index.clear();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.arena.check_list(&self.list, "ghost")?;
        self.index.check_invariants()?;
        ensure(self.list.len() == self.index.len(), || {
            format!("ghost: list has {} keys, index has {}", self.list.len(), self.index.len())
        })?;
        ensure(self.list.len() <= self.capacity, || {
            format!("ghost: {} keys over capacity {}", self.list.len(), self.capacity)
        })?;
        for (id, key) in self.arena.iter(&self.list) {
            ensure(self.index.peek(key) == Some(&id), || {
                format!("ghost: index handle for slot {} is stale", id.index())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_list_records_and_trims_oldest() {
        let mut ghost = GhostList::new(2);
        ghost.record("a");
        ghost.record("b");
        assert!(ghost.contains(&"a"));
        assert!(ghost.contains(&"b"));

        ghost.record("c");
        assert!(!ghost.contains(&"a"));
        assert!(ghost.contains(&"b"));
        assert!(ghost.contains(&"c"));
        assert_eq!(ghost.len(), 2);
        ghost.check_invariants().unwrap();
    }

    #[test]
    fn ghost_list_rerecord_refreshes_position() {
        let mut ghost = GhostList::new(3);
        ghost.record("a");
        ghost.record("b");
        ghost.record("c");

        ghost.record("a");
        ghost.record("d");

        assert!(ghost.contains(&"a"));
        assert!(!ghost.contains(&"b"));
        assert_eq!(ghost.iter().copied().collect::<Vec<_>>(), vec!["d", "a", "c"]);
    }

    #[test]
    fn ghost_list_zero_capacity_is_noop() {
        let mut ghost = GhostList::new(0);
        ghost.record("a");
        assert!(ghost.is_empty());
        assert!(!ghost.contains(&"a"));
    }

    #[test]
    fn ghost_list_remove_and_pop() {
        let mut ghost = GhostList::new(4);
        ghost.record(1);
        ghost.record(2);
        ghost.record(3);

        assert!(ghost.remove(&2));
        assert!(!ghost.remove(&2));
        assert_eq!(ghost.pop_oldest(), Some(1));
        assert_eq!(ghost.len(), 1);
        ghost.check_invariants().unwrap();

        ghost.clear();
        assert!(ghost.is_empty());
        assert_eq!(ghost.pop_oldest(), None);
    }

    #[test]
    fn ghost_list_survives_index_growth() {
        let mut ghost = GhostList::new(100);
        for i in 0..250u32 {
            ghost.record(i);
        }
        assert_eq!(ghost.len(), 100);
        assert!(ghost.contains(&249));
        assert!(!ghost.contains(&149));
        ghost.check_invariants().unwrap();
    }

    #[test]
    fn ghost_list_borrowed_lookup() {
        let mut ghost: GhostList<String> = GhostList::new(2);
        ghost.record("evicted".to_string());
        assert!(ghost.contains("evicted"));
        assert!(ghost.remove("evicted"));
        assert!(!ghost.contains("evicted"));
    }
}
