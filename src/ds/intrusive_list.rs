//! Intrusive doubly linked lists backed by a shared `SlotArena`.
//!
//! Nodes live in a [`ListArena`] and are linked by [`SlotId`]. The list
//! itself ([`IntrusiveList`]) is only a `head`/`tail`/`len` triple, so one
//! arena can back several lists at once: ARC keeps T1 and T2 in the same
//! arena, 2Q keeps A1in and Am, LFU keeps one list per frequency bucket.
//! Moving an entry between lists is an unlink + relink; its `SlotId` never
//! changes, so the key index does not need to be touched.
//!
//! ## Architecture
//!
//! ```text
//!   arena (SlotArena<Node<T>>)
//!   ┌────────┬─────────────────────────────────────────────┐
//!   │ SlotId │ Node { value, prev, next }                  │
//!   ├────────┼─────────────────────────────────────────────┤
//!   │ id_1   │ { value: A, prev: None, next: Some(id_2) }  │  list t1
//!   │ id_2   │ { value: B, prev: Some(id_1), next: None }  │  list t1
//!   │ id_3   │ { value: C, prev: None, next: None }        │  list t2
//!   └────────┴─────────────────────────────────────────────┘
//!
//!   t1: head ─► [id_1] ◄──► [id_2] ◄── tail
//!   t2: head ─► [id_3] ◄── tail
//! ```
//!
//! ## Operations
//! - `push_front` / `push_back` / `insert_after`: allocate + link, O(1)
//! - `move_to_front`: unlink + link at head, O(1)
//! - `transfer_front`: unlink from one list, link at the head of another, O(1)
//! - `remove` / `pop_front` / `pop_back`: unlink + free slot, O(1)
//!
//! Callers must pass the list a node actually belongs to; policies record the
//! membership in their entries. `check_list` walks a list and verifies links.

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::{InvariantError, ensure};

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Head/tail/length of one list living in a [`ListArena`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntrusiveList {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl IntrusiveList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Front (MRU / newest) node.
    pub fn front(&self) -> Option<SlotId> {
        self.head
    }

    /// Back (LRU / oldest) node.
    pub fn back(&self) -> Option<SlotId> {
        self.tail
    }
}

/// Arena of list nodes shared by any number of [`IntrusiveList`]s.
#[derive(Debug)]
pub struct ListArena<T> {
    nodes: SlotArena<Node<T>>,
}

impl<T> ListArena<T> {
    pub fn new() -> Self {
        Self {
            nodes: SlotArena::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: SlotArena::with_capacity(capacity),
        }
    }

    /// Total nodes across all lists.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.nodes.contains(id)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.value)
    }

    /// Node after `id` (towards the tail).
    pub fn next(&self, id: SlotId) -> Option<SlotId> {
        self.nodes.get(id).and_then(|node| node.next)
    }

    /// Node before `id` (towards the head).
    pub fn prev(&self, id: SlotId) -> Option<SlotId> {
        self.nodes.get(id).and_then(|node| node.prev)
    }

    pub fn push_front(&mut self, list: &mut IntrusiveList, value: T) -> SlotId {
        let id = self.alloc(value);
        self.link_front(list, id);
        id
    }

    pub fn push_back(&mut self, list: &mut IntrusiveList, value: T) -> SlotId {
        let id = self.alloc(value);
        self.link_back(list, id);
        id
    }

    /// Inserts `value` directly after `after`; falls back to the front when
    /// `after` is `None`.
    pub fn insert_after(
        &mut self,
        list: &mut IntrusiveList,
        after: Option<SlotId>,
        value: T,
    ) -> SlotId {
        let Some(after) = after.filter(|&id| self.nodes.contains(id)) else {
            return self.push_front(list, value);
        };
        let next = self.next(after);
        let id = self.nodes.insert(Node {
            value,
            prev: Some(after),
            next,
        });
        if let Some(node) = self.nodes.get_mut(after) {
            node.next = Some(id);
        }
        match next {
            Some(next_id) => {
                if let Some(node) = self.nodes.get_mut(next_id) {
                    node.prev = Some(id);
                }
            },
            None => list.tail = Some(id),
        }
        list.len += 1;
        id
    }

    pub fn pop_front(&mut self, list: &mut IntrusiveList) -> Option<T> {
        let id = list.head?;
        self.remove(list, id)
    }

    pub fn pop_back(&mut self, list: &mut IntrusiveList) -> Option<T> {
        let id = list.tail?;
        self.remove(list, id)
    }

    /// Unlinks `id` from `list` and frees its slot.
    pub fn remove(&mut self, list: &mut IntrusiveList, id: SlotId) -> Option<T> {
        self.unlink(list, id)?;
        self.nodes.remove(id).map(|node| node.value)
    }

    /// Moves an existing node to the front of its list.
    pub fn move_to_front(&mut self, list: &mut IntrusiveList, id: SlotId) -> bool {
        if !self.nodes.contains(id) {
            return false;
        }
        if list.head == Some(id) {
            return true;
        }
        self.unlink(list, id);
        self.link_front(list, id);
        true
    }

    /// Moves `id` from `from` to the front of `to`, keeping its `SlotId`.
    pub fn transfer_front(
        &mut self,
        from: &mut IntrusiveList,
        to: &mut IntrusiveList,
        id: SlotId,
    ) -> bool {
        if self.unlink(from, id).is_none() {
            return false;
        }
        self.link_front(to, id);
        true
    }

    /// Moves `id` from `from` to the back of `to`, keeping its `SlotId`.
    pub fn transfer_back(
        &mut self,
        from: &mut IntrusiveList,
        to: &mut IntrusiveList,
        id: SlotId,
    ) -> bool {
        if self.unlink(from, id).is_none() {
            return false;
        }
        self.link_back(to, id);
        true
    }

    /// Iterates `list` front to back.
    pub fn iter<'a>(&'a self, list: &IntrusiveList) -> Iter<'a, T> {
        Iter {
            arena: self,
            current: list.head,
            remaining: list.len,
        }
    }

    /// Drops every node; all lists backed by this arena must be reset too.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Walks `list` and verifies prev/next symmetry and the recorded length.
    pub fn check_list(&self, list: &IntrusiveList, name: &str) -> Result<(), InvariantError> {
        if list.head.is_none() || list.tail.is_none() {
            return ensure(list.head.is_none() && list.tail.is_none() && list.len == 0, || {
                format!("{name}: empty list has a dangling head/tail or nonzero len")
            });
        }

        let mut count = 0usize;
        let mut prev = None;
        let mut current = list.head;
        while let Some(id) = current {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| InvariantError::new(format!("{name}: missing node {id:?}")))?;
            ensure(node.prev == prev, || format!("{name}: broken prev link at {id:?}"))?;
            count += 1;
            ensure(count <= list.len, || format!("{name}: longer than recorded len {}", list.len))?;
            prev = Some(id);
            current = node.next;
        }
        ensure(list.tail == prev, || format!("{name}: tail does not end the chain"))?;
        ensure(count == list.len, || format!("{name}: walked {count} nodes, len says {}", list.len))
    }

    fn alloc(&mut self, value: T) -> SlotId {
        self.nodes.insert(Node {
            value,
            prev: None,
            next: None,
        })
    }

    fn unlink(&mut self, list: &mut IntrusiveList, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.nodes.get(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.nodes.get_mut(prev_id) {
                    prev_node.next = next;
                }
            },
            None => list.head = next,
        }

        match next {
            Some(next_id) => {
                if let Some(next_node) = self.nodes.get_mut(next_id) {
                    next_node.prev = prev;
                }
            },
            None => list.tail = prev,
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = None;
        }
        list.len -= 1;
        Some(())
    }

    fn link_front(&mut self, list: &mut IntrusiveList, id: SlotId) {
        let old_head = list.head;
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => {
                if let Some(head_node) = self.nodes.get_mut(head) {
                    head_node.prev = Some(id);
                }
            },
            None => list.tail = Some(id),
        }
        list.head = Some(id);
        list.len += 1;
    }

    fn link_back(&mut self, list: &mut IntrusiveList, id: SlotId) {
        let old_tail = list.tail;
        if let Some(node) = self.nodes.get_mut(id) {
            node.next = None;
            node.prev = old_tail;
        }
        match old_tail {
            Some(tail) => {
                if let Some(tail_node) = self.nodes.get_mut(tail) {
                    tail_node.next = Some(id);
                }
            },
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;
    }
}

impl<T> Default for ListArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over `(SlotId, &T)` pairs from front to back.
pub struct Iter<'a, T> {
    arena: &'a ListArena<T>,
    current: Option<SlotId>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SlotId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.current?;
        let node = self.arena.nodes.get(id)?;
        self.current = node.next;
        self.remaining -= 1;
        Some((id, &node.value))
    }
}
