//! # LFU (Least Frequently Used) Policy
//!
//! Evicts the entry with the lowest access count, breaking ties by arrival
//! order inside that count. Frequency buckets form a sorted list; each bucket
//! owns the list of entries sharing its count, so every operation is O(1).
//!
//! ## Architecture
//!
//! ```text
//!   buckets (ascending freq, ListArena<Bucket>)
//!   head ─► ┌────────┐ ◄──► ┌────────┐ ◄──► ┌────────┐ ◄─ tail
//!           │ freq 1 │      │ freq 2 │      │ freq 5 │
//!           └───┬────┘      └───┬────┘      └───┬────┘
//!               ▼               ▼               ▼
//!   entries   [C]─[D]          [B]             [A]        (ListArena<Entry>)
//!           oldest  newest
//!
//!   index: IncrementalHashTable<K, SlotId>  key → entry slot
//!   Entry { key, value, expires_at, bucket: SlotId }
//! ```
//!
//! ## Operations
//!
//! ```text
//!   put(new)   entry appended to bucket 1 (created at the head if absent)
//!   get / put  entry moves to bucket freq+1, created right after the old
//!              bucket when absent; an emptied bucket is unlinked at once
//!   evict()    front entry of the head bucket (oldest arrival at the
//!              lowest frequency)
//! ```
//!
//! `put` never evicts; reclamation drives [`EvictionPolicy::evict`].
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use shardkv::policy::LfuCache;
//! use shardkv::traits::EvictionPolicy;
//!
//! let mut cache = LfuCache::new(2, Duration::from_secs(60));
//! cache.put("a", 1);
//! cache.put("b", 2);
//! cache.get(&"a");
//! cache.put("c", 3);
//!
//! cache.evict();
//! assert!(!cache.contains(&"b"));
//! assert_eq!(cache.frequency(&"a"), Some(2));
//! ```

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

#[derive(Debug)]
struct Bucket {
    freq: u64,
    entries: IntrusiveList,
}

struct Entry<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    bucket: SlotId,
}

/// Single-threaded LFU cache with TTL.
pub struct LfuCache<K, V> {
    entries: ListArena<Entry<K, V>>,
    buckets: ListArena<Bucket>,
    bucket_order: IntrusiveList,
    index: IncrementalHashTable<K, SlotId>,
    capacity: usize,
    expiry: Expiry,
}

impl<K, V> LfuCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let mut index = IncrementalHashTable::new();
        index.reserve(capacity.min(PRESIZE_LIMIT));
        Self {
            entries: ListArena::with_capacity(capacity.min(PRESIZE_LIMIT)),
            buckets: ListArena::new(),
            bucket_order: IntrusiveList::new(),
            index,
            capacity,
            expiry: Expiry::new(ttl),
        }
    }

    /// Access count of a resident key.
    pub fn frequency<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = *self.index.peek(key)?;
        let bucket = self.entries.get(id)?.bucket;
        self.buckets.get(bucket).map(|b| b.freq)
    }

    /// Lowest access count currently resident.
    pub fn min_frequency(&self) -> Option<u64> {
        self.buckets.get(self.bucket_order.front()?).map(|b| b.freq)
    }

    /// Number of distinct frequencies.
    pub fn bucket_count(&self) -> usize {
        self.bucket_order.len()
    }

    /// Next eviction victim without removing it.
    pub fn peek_lfu(&self) -> Option<(&K, &V)> {
        let bucket = self.buckets.get(self.bucket_order.front()?)?;
        let entry = self.entries.get(bucket.entries.front()?)?;
        Some((&entry.key, &entry.value))
    }

    /// Appends a new entry to the frequency-1 bucket.
    fn insert_new(&mut self, key: K, value: V, expires_at: Instant) {
        let bucket_id = match self.bucket_order.front() {
            Some(front) if self.buckets.get(front).is_some_and(|b| b.freq == 1) => front,
            _ => self.buckets.push_front(
                &mut self.bucket_order,
                Bucket {
                    freq: 1,
                    entries: IntrusiveList::new(),
                },
            ),
        };

        let Some(bucket) = self.buckets.get_mut(bucket_id) else {
            return;
        };
        let id = self.entries.push_back(
            &mut bucket.entries,
            Entry {
                key: key.clone(),
                value,
                expires_at,
                bucket: bucket_id,
            },
        );
        self.index.insert_or_assign(key, id);
    }

    /// Moves entry `id` from its bucket to the `freq + 1` bucket.
    fn increment(&mut self, id: SlotId) -> Option<()> {
        let from_id = self.entries.get(id)?.bucket;
        let (freq, mut from) = {
            let bucket = self.buckets.get(from_id)?;
            (bucket.freq, bucket.entries)
        };
        let next_freq = freq.saturating_add(1);

        let to_id = match self.buckets.next(from_id) {
            Some(next) if self.buckets.get(next).is_some_and(|b| b.freq == next_freq) => next,
            _ => self.buckets.insert_after(
                &mut self.bucket_order,
                Some(from_id),
                Bucket {
                    freq: next_freq,
                    entries: IntrusiveList::new(),
                },
            ),
        };
        let mut to = self.buckets.get(to_id)?.entries;

        self.entries.transfer_back(&mut from, &mut to, id);
        self.entries.get_mut(id)?.bucket = to_id;
        self.buckets.get_mut(to_id)?.entries = to;
        self.store_bucket_list(from_id, from);
        Some(())
    }

    /// Writes back a bucket's entry list, unlinking the bucket once empty.
    fn store_bucket_list(&mut self, bucket_id: SlotId, list: IntrusiveList) {
        if list.is_empty() {
            self.buckets.remove(&mut self.bucket_order, bucket_id);
        } else if let Some(bucket) = self.buckets.get_mut(bucket_id) {
            bucket.entries = list;
        }
    }

    fn remove_slot(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        let bucket_id = self.entries.get(id)?.bucket;
        let mut list = self.buckets.get(bucket_id)?.entries;
        let entry = self.entries.remove(&mut list, id)?;
        self.store_bucket_list(bucket_id, list);
        self.index.erase(&entry.key);
        Some(entry)
    }
}

impl<K, V> EvictionPolicy<K, V> for LfuCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn put(&mut self, key: K, value: V) {
        let expires_at = self.expiry.deadline(Instant::now());
        match self.index.get(&key).copied() {
            Some(id) => {
                if let Some(entry) = self.entries.get_mut(id) {
                    entry.value = value;
                    entry.expires_at = expires_at;
                }
                self.increment(id);
            },
            None => self.insert_new(key, value, expires_at),
        }
    }

    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let id = *self.index.get(key)?;
        if is_expired(self.entries.get(id)?.expires_at, now) {
            self.remove_slot(id);
            return None;
        }

        self.increment(id)?;
        let entry = self.entries.get_mut(id)?;
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
        let victim = self
            .bucket_order
            .front()
            .and_then(|bucket| self.buckets.get(bucket))
            .and_then(|bucket| bucket.entries.front());
        match victim {
            Some(id) if self.remove_slot(id).is_some() => 1,
            _ => 0,
        }
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .peek(key)
            .and_then(|&id| self.entries.get(id))
            .is_some_and(|entry| !is_expired(entry.expires_at, Instant::now()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn ttl(&self) -> Duration {
        self.expiry.ttl()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
        self.bucket_order = IntrusiveList::new();
        self.index.clear();
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.buckets.check_list(&self.bucket_order, "lfu buckets")?;
        self.index.check_invariants()?;

        let mut total = 0usize;
        let mut last_freq = 0u64;
        for (bucket_id, bucket) in self.buckets.iter(&self.bucket_order) {
            ensure(bucket.freq > last_freq, || {
                format!("lfu: bucket {} not above previous {last_freq}", bucket.freq)
            })?;
            ensure(!bucket.entries.is_empty(), || {
                format!("lfu: empty bucket for freq {} left linked", bucket.freq)
            })?;
            self.entries.check_list(&bucket.entries, "lfu bucket entries")?;
            for (id, entry) in self.entries.iter(&bucket.entries) {
                ensure(entry.bucket == bucket_id, || {
                    format!("lfu: entry in freq {} points at another bucket", bucket.freq)
                })?;
                ensure(self.index.peek(&entry.key) == Some(&id), || {
                    format!("lfu: index handle for slot {} is stale", id.index())
                })?;
            }
            last_freq = bucket.freq;
            total += bucket.entries.len();
        }

        ensure(total == self.entries.len(), || {
            format!("lfu: buckets hold {total} entries, arena has {}", self.entries.len())
        })?;
        ensure(self.index.len() == self.entries.len(), || {
            format!("lfu: index has {} keys, arena has {}", self.index.len(), self.entries.len())
        })
    }
}

impl<K, V> fmt::Debug for LfuCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfuCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("buckets", &self.bucket_order.len())
            .field("ttl", &self.expiry.ttl())
            .finish_non_exhaustive()
    }
}
