//! Chained hash table with incremental rehashing.
//!
//! Growth never pays a full O(n) rehash on one call. When the load factor
//! crosses the threshold, the current table becomes the *previous* table and
//! a new *active* table of twice the bucket count is allocated. Every
//! subsequent operation first migrates a bounded number of buckets from the
//! previous table into the active one, so the rehash cost is spread across
//! many calls and per-call latency stays bounded.
//!
//! ## Architecture
//!
//! ```text
//!   active (2^(n+1) buckets)             previous (2^n buckets, draining)
//!   ┌────┬──────────────────────┐        ┌────┬─────────────────────┐
//!   │  0 │ ─► [k7] ─► [k3]      │        │  0 │ (migrated)          │
//!   │  1 │ ─► [k9]              │ ◄───── │  1 │ (migrated)          │
//!   │  2 │                      │  step  │  2 │ ─► [k2] ─► [k6]     │ ◄ migrate_pos
//!   │ .. │                      │        │ .. │                     │
//!   └────┴──────────────────────┘        └────┴─────────────────────┘
//!
//!   lookup(k): active first, then previous (while migrating)
//!   insert(k): new keys always land in active
//! ```
//!
//! ## Operations
//!
//! | Operation          | Time        | Notes                                   |
//! |--------------------|-------------|-----------------------------------------|
//! | `insert_or_assign` | O(1) avg    | May start a migration                   |
//! | `get` / `erase`    | O(1) avg    | Consult both tables while migrating     |
//! | `peek`             | O(1) avg    | No migration step (`&self`)             |
//! | `reserve`          | O(1)*       | *Immediate when empty, else migrating   |
//!
//! Each migration step moves at most `migrate_per_op` non-empty buckets and
//! visits at most ten times that many empty ones.
//!
//! ## Example
//!
//! ```
//! use shardkv::ds::IncrementalHashTable;
//!
//! let mut table: IncrementalHashTable<String, u32> = IncrementalHashTable::with_buckets(4);
//! for i in 0..64 {
//!     table.insert_or_assign(format!("key{i}"), i);
//! }
//! assert_eq!(table.get("key17"), Some(&17));
//! assert!(table.erase("key17"));
//! assert_eq!(table.len(), 63);
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use rustc_hash::FxHasher;

use crate::error::{InvariantError, ensure};

/// Default hasher for the cache index.
pub type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Bucket count of a freshly created table.
pub const DEFAULT_BUCKETS: usize = 4;
/// Load factor above which growth starts.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 1.0;
/// Non-empty buckets migrated per operation.
pub const DEFAULT_MIGRATE_PER_OP: usize = 1;

const EMPTY_VISITS_PER_STEP: usize = 10;

struct Node<K, V> {
    hash: u64,
    key: K,
    value: V,
    next: Link<K, V>,
}

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Table<K, V> {
    buckets: Vec<Link<K, V>>,
    mask: usize,
}

impl<K, V> Table<K, V> {
    fn new(buckets: usize) -> Self {
        debug_assert!(buckets.is_power_of_two());
        let mut slots = Vec::with_capacity(buckets);
        slots.resize_with(buckets, || None);
        Self {
            buckets: slots,
            mask: buckets - 1,
        }
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn slot(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut cur = self.buckets[self.slot(hash)].as_deref();
        while let Some(node) = cur {
            if node.hash == hash && node.key.borrow() == key {
                return Some(node);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn find_mut<Q>(&mut self, hash: u64, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let slot = self.slot(hash);
        let mut cur = self.buckets[slot].as_deref_mut();
        while let Some(node) = cur {
            if node.hash == hash && node.key.borrow() == key {
                return Some(&mut node.value);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    fn push(&mut self, mut node: Box<Node<K, V>>) {
        let slot = self.slot(node.hash);
        node.next = self.buckets[slot].take();
        self.buckets[slot] = Some(node);
    }

    fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let slot = self.slot(hash);
        let mut cur = &mut self.buckets[slot];
        while cur
            .as_ref()
            .is_some_and(|node| !(node.hash == hash && node.key.borrow() == key))
        {
            cur = &mut cur.as_mut()?.next;
        }
        let node = cur.take()?;
        let Node {
            key, value, next, ..
        } = *node;
        *cur = next;
        Some((key, value))
    }

    fn iter(&self) -> impl Iterator<Item = &Node<K, V>> {
        self.buckets.iter().flat_map(|bucket| {
            std::iter::successors(bucket.as_deref(), |node| node.next.as_deref())
        })
    }
}

/// Hash table whose growth is amortized over subsequent operations.
pub struct IncrementalHashTable<K, V, S = FxBuildHasher> {
    active: Table<K, V>,
    previous: Option<Table<K, V>>,
    /// Next bucket of `previous` to migrate.
    migrate_pos: usize,
    len: usize,
    max_load_factor: f64,
    migrate_per_op: usize,
    hasher: S,
}

impl<K, V> IncrementalHashTable<K, V, FxBuildHasher>
where
    K: Eq + Hash,
{
    /// Creates a table with [`DEFAULT_BUCKETS`] buckets.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// Creates a table with at least `buckets` buckets (rounded up to a power of two).
    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_config(
            buckets,
            DEFAULT_MAX_LOAD_FACTOR,
            DEFAULT_MIGRATE_PER_OP,
            FxBuildHasher::default(),
        )
    }
}

impl<K, V, S> IncrementalHashTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Creates a table with explicit growth parameters.
    ///
    /// A non-positive load factor falls back to [`DEFAULT_MAX_LOAD_FACTOR`];
    /// `migrate_per_op` is clamped to at least 1.
    pub fn with_config(buckets: usize, max_load_factor: f64, migrate_per_op: usize, hasher: S) -> Self {
        let max_load_factor = if max_load_factor > 0.0 {
            max_load_factor
        } else {
            DEFAULT_MAX_LOAD_FACTOR
        };
        Self {
            active: Table::new(buckets.max(1).next_power_of_two()),
            previous: None,
            migrate_pos: 0,
            len: 0,
            max_load_factor,
            migrate_per_op: migrate_per_op.max(1),
            hasher,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` while a previous table is still being drained.
    pub fn is_rehashing(&self) -> bool {
        self.previous.is_some()
    }

    /// Buckets across both tables.
    pub fn bucket_count(&self) -> usize {
        self.active.bucket_count() + self.previous.as_ref().map_or(0, Table::bucket_count)
    }

    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.bucket_count() as f64
    }

    /// Inserts `key` or overwrites its value. Returns the previous value.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Option<V> {
        self.migrate_step();
        let hash = self.hash(&key);

        if let Some(slot) = self.active.find_mut(hash, &key) {
            return Some(std::mem::replace(slot, value));
        }
        if let Some(prev) = self.previous.as_mut()
            && let Some(slot) = prev.find_mut(hash, &key)
        {
            return Some(std::mem::replace(slot, value));
        }

        self.active.push(Box::new(Node {
            hash,
            key,
            value,
            next: None,
        }));
        self.len += 1;
        self.maybe_grow();
        None
    }

    /// Looks up `key`, performing one migration step first.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.migrate_step();
        self.peek(key)
    }

    /// Mutable lookup, performing one migration step first.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.migrate_step();
        let hash = self.hash(key);
        let Self {
            active, previous, ..
        } = self;
        match active.find_mut(hash, key) {
            Some(value) => Some(value),
            None => previous.as_mut()?.find_mut(hash, key),
        }
    }

    /// Looks up `key` without advancing the migration.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.active
            .find(hash, key)
            .or_else(|| self.previous.as_ref()?.find(hash, key))
            .map(|node| &node.value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.peek(key).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.migrate_step();
        let hash = self.hash(key);
        let removed = match self.active.remove(hash, key) {
            Some(pair) => Some(pair),
            None => self.previous.as_mut().and_then(|prev| prev.remove(hash, key)),
        };
        removed.map(|(_, value)| {
            self.len -= 1;
            value
        })
    }

    /// Removes `key`; returns whether it was present.
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Ensures room for `entries` without crossing the load factor.
    ///
    /// An empty table is resized on the spot; otherwise growth proceeds
    /// through the normal incremental migration. Ignored while a migration
    /// is already running. A request whose bucket count does not fit in
    /// `usize` is ignored and the table keeps growing on demand.
    pub fn reserve(&mut self, entries: usize) {
        let Some(wanted) = ((entries as f64 / self.max_load_factor).ceil() as usize)
            .max(DEFAULT_BUCKETS)
            .checked_next_power_of_two()
        else {
            return;
        };
        if self.is_rehashing() || wanted <= self.active.bucket_count() {
            return;
        }
        if self.len == 0 {
            self.active = Table::new(wanted);
        } else {
            self.start_migration(wanted);
        }
    }

    pub fn clear(&mut self) {
        let buckets = DEFAULT_BUCKETS.max(self.active.bucket_count() / 2).next_power_of_two();
        self.active = Table::new(buckets);
        self.previous = None;
        self.migrate_pos = 0;
        self.len = 0;
    }

    /// Migrates until the previous table is gone.
    pub fn finish_rehash(&mut self) {
        while self.is_rehashing() {
            self.migrate_step();
        }
    }

    /// Iterates all entries (active table first), in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.active
            .iter()
            .chain(self.previous.iter().flat_map(Table::iter))
            .map(|node| (&node.key, &node.value))
    }

    /// Verifies the entry count and that every node sits in its home bucket.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut count = 0usize;
        for (name, table) in std::iter::once(("active", &self.active))
            .chain(self.previous.as_ref().map(|prev| ("previous", prev)))
        {
            for (slot, bucket) in table.buckets.iter().enumerate() {
                let chain = std::iter::successors(bucket.as_deref(), |node| node.next.as_deref());
                for node in chain {
                    ensure(table.slot(node.hash) == slot, || {
                        format!("{name} table: node hashed to slot {} found in {slot}", table.slot(node.hash))
                    })?;
                    ensure(self.hash(&node.key) == node.hash, || {
                        format!("{name} table: stale cached hash")
                    })?;
                    count += 1;
                }
            }
        }
        if let Some(prev) = &self.previous {
            ensure(prev.buckets[..self.migrate_pos].iter().all(Option::is_none), || {
                "previous table: migrated bucket is not empty".to_string()
            })?;
        }
        ensure(count == self.len, || format!("walked {count} nodes, len says {}", self.len))
    }

    #[inline]
    fn hash<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.hasher.hash_one(key)
    }

    fn maybe_grow(&mut self) {
        if self.is_rehashing() {
            return;
        }
        let buckets = self.active.bucket_count();
        if self.len as f64 > buckets as f64 * self.max_load_factor {
            self.start_migration(buckets * 2);
        }
    }

    fn start_migration(&mut self, buckets: usize) {
        let old = std::mem::replace(&mut self.active, Table::new(buckets));
        self.previous = Some(old);
        self.migrate_pos = 0;
    }

    /// Moves up to `migrate_per_op` non-empty buckets into the active table.
    fn migrate_step(&mut self) {
        let Some(prev) = self.previous.as_mut() else {
            return;
        };

        let mut moved = 0usize;
        let mut empty_visits = self.migrate_per_op * EMPTY_VISITS_PER_STEP;
        while moved < self.migrate_per_op && self.migrate_pos < prev.bucket_count() {
            let mut chain = prev.buckets[self.migrate_pos].take();
            self.migrate_pos += 1;
            if chain.is_none() {
                empty_visits -= 1;
                if empty_visits == 0 {
                    break;
                }
                continue;
            }
            while let Some(mut node) = chain {
                chain = node.next.take();
                self.active.push(node);
            }
            moved += 1;
        }

        if self.migrate_pos >= prev.bucket_count() {
            self.previous = None;
            self.migrate_pos = 0;
        }
    }
}

impl<K, V> Default for IncrementalHashTable<K, V, FxBuildHasher>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> fmt::Debug for IncrementalHashTable<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalHashTable")
            .field("len", &self.len)
            .field("active_buckets", &self.active.bucket_count())
            .field("rehashing", &self.previous.is_some())
            .field("migrate_pos", &self.migrate_pos)
            .finish_non_exhaustive()
    }
}

impl<K, V, S> Drop for IncrementalHashTable<K, V, S> {
    // Unlink chains iteratively so long buckets cannot overflow the stack.
    fn drop(&mut self) {
        let tables = std::iter::once(&mut self.active).chain(self.previous.as_mut());
        for table in tables {
            for bucket in table.buckets.iter_mut() {
                let mut chain = bucket.take();
                while let Some(mut node) = chain {
                    chain = node.next.take();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::hash::Hasher;

    #[test]
    fn insert_get_overwrite_erase() {
        let mut table: IncrementalHashTable<String, u32> = IncrementalHashTable::new();
        assert_eq!(table.insert_or_assign("a".into(), 1), None);
        assert_eq!(table.insert_or_assign("b".into(), 2), None);
        assert_eq!(table.insert_or_assign("a".into(), 10), Some(1));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a"), Some(&10));
        assert_eq!(table.get("missing"), None);

        assert!(table.erase("a"));
        assert!(!table.erase("a"));
        assert_eq!(table.len(), 1);
        table.check_invariants().unwrap();
    }

    #[test]
    fn growth_starts_migration_and_completes() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::with_buckets(4);
        for i in 0..5 {
            table.insert_or_assign(i, i);
        }
        // 5 entries over 4 buckets crosses load factor 1.0
        assert!(table.is_rehashing());
        assert_eq!(table.bucket_count(), 4 + 8);

        for i in 0..5 {
            assert_eq!(table.get(&i), Some(&i));
        }
        table.finish_rehash();
        assert!(!table.is_rehashing());
        assert_eq!(table.bucket_count(), 8);
        table.check_invariants().unwrap();
    }

    #[test]
    fn overwrite_during_migration_hits_previous_table() {
        let mut table: IncrementalHashTable<u64, &str> =
            IncrementalHashTable::with_config(4, 1.0, 1, FxBuildHasher::default());
        for i in 0..5 {
            table.insert_or_assign(i, "old");
        }
        assert!(table.is_rehashing());
        for i in 0..5 {
            assert_eq!(table.insert_or_assign(i, "new"), Some("old"));
        }
        assert_eq!(table.len(), 5);
        for i in 0..5 {
            assert_eq!(table.peek(&i), Some(&"new"));
        }
        table.check_invariants().unwrap();
    }

    #[test]
    fn erase_during_migration_consults_both_tables() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::with_buckets(4);
        for i in 0..5 {
            table.insert_or_assign(i, i);
        }
        assert!(table.is_rehashing());
        for i in 0..5 {
            assert_eq!(table.remove(&i), Some(i));
        }
        assert!(table.is_empty());
        table.check_invariants().unwrap();
    }

    #[test]
    fn reserve_on_empty_table_resizes_immediately() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::new();
        table.reserve(100);
        assert!(!table.is_rehashing());
        assert_eq!(table.bucket_count(), 128);

        for i in 0..100 {
            table.insert_or_assign(i, i);
        }
        assert!(!table.is_rehashing());
    }

    #[test]
    fn reserve_on_populated_table_migrates() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::new();
        table.insert_or_assign(1, 1);
        table.reserve(64);
        assert!(table.is_rehashing());
        assert_eq!(table.get(&1), Some(&1));
        table.finish_rehash();
        assert_eq!(table.bucket_count(), 64);
    }

    #[test]
    fn reserve_beyond_addressable_buckets_is_ignored() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::new();
        table.reserve(usize::MAX);
        assert_eq!(table.bucket_count(), DEFAULT_BUCKETS);
        assert!(!table.is_rehashing());

        table.insert_or_assign(1, 1);
        assert_eq!(table.get(&1), Some(&1));
    }

    /// Hashes a `u64` to itself so bucket placement is known in advance.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    type IdentityTable = IncrementalHashTable<u64, u64, BuildHasherDefault<IdentityHasher>>;

    fn identity_table(buckets: usize, migrate_per_op: usize) -> IdentityTable {
        IncrementalHashTable::with_config(buckets, 1.0, migrate_per_op, BuildHasherDefault::default())
    }

    #[test]
    fn migration_moves_at_most_k_buckets_per_op() {
        // slots 0, 1, 2, 3, 0: the fifth insert starts growth to 8 buckets
        let mut table = identity_table(4, 1);
        for key in [0, 1, 2, 3, 4] {
            table.insert_or_assign(key, key);
        }
        assert!(table.is_rehashing());

        for expected_pos in 1..=3 {
            table.get(&99);
            assert!(table.is_rehashing());
            assert_eq!(table.migrate_pos, expected_pos);
            table.check_invariants().unwrap();
        }
        table.get(&99);
        assert!(!table.is_rehashing());

        let mut table = identity_table(4, 2);
        for key in [0, 1, 2, 3, 4] {
            table.insert_or_assign(key, key);
        }
        table.get(&99);
        assert!(table.is_rehashing());
        assert_eq!(table.migrate_pos, 2);
        table.get(&99);
        assert!(!table.is_rehashing());
        for key in 0..5 {
            assert_eq!(table.peek(&key), Some(&key));
        }
    }

    #[test]
    fn migration_visits_at_most_ten_k_empty_buckets_per_op() {
        // previous table: 64 buckets, only slots 0 and 63 occupied
        let mut table = identity_table(64, 1);
        table.insert_or_assign(0, 0);
        table.insert_or_assign(63, 63);
        table.reserve(256);
        assert!(table.is_rehashing());

        // one non-empty bucket, then runs of ten empty ones
        for expected_pos in [1, 11, 21, 31, 41, 51, 61] {
            table.get(&1000);
            assert!(table.is_rehashing(), "drained early at {expected_pos}");
            assert_eq!(table.migrate_pos, expected_pos);
        }
        // 61 and 62 are empty, 63 is the last non-empty bucket
        table.get(&1000);
        assert!(!table.is_rehashing());
        assert_eq!(table.peek(&0), Some(&0));
        assert_eq!(table.peek(&63), Some(&63));
        table.check_invariants().unwrap();
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut table: IncrementalHashTable<&str, u32> = IncrementalHashTable::new();
        table.insert_or_assign("k", 1);
        if let Some(v) = table.get_mut("k") {
            *v += 1;
        }
        assert_eq!(table.peek("k"), Some(&2));
    }

    #[test]
    fn clear_resets_state() {
        let mut table: IncrementalHashTable<u64, u64> = IncrementalHashTable::new();
        for i in 0..50 {
            table.insert_or_assign(i, i);
        }
        table.clear();
        assert!(table.is_empty());
        assert!(!table.is_rehashing());
        assert_eq!(table.iter().count(), 0);
        table.check_invariants().unwrap();
    }

    proptest! {
        /// Every resident key stays reachable at every step of growth.
        #[test]
        fn keys_reachable_through_every_migration_step(keys in prop::collection::hash_set(any::<u32>(), 1..300)) {
            let mut table: IncrementalHashTable<u32, u32> = IncrementalHashTable::with_buckets(4);
            let mut inserted = Vec::new();
            for key in keys {
                table.insert_or_assign(key, key.wrapping_mul(3));
                inserted.push(key);
                for k in &inserted {
                    prop_assert_eq!(table.peek(k), Some(&k.wrapping_mul(3)));
                }
            }
            prop_assert_eq!(table.len(), inserted.len());
            prop_assert!(table.check_invariants().is_ok());
        }

        #[test]
        fn mixed_ops_match_std_hashmap(ops in prop::collection::vec((0u8..3, 0u16..64, any::<u32>()), 1..400)) {
            let mut table: IncrementalHashTable<u16, u32> = IncrementalHashTable::with_buckets(4);
            let mut model = std::collections::HashMap::new();
            for (op, key, value) in ops {
                match op {
                    0 => prop_assert_eq!(table.insert_or_assign(key, value), model.insert(key, value)),
                    1 => prop_assert_eq!(table.remove(&key), model.remove(&key)),
                    _ => prop_assert_eq!(table.get(&key), model.get(&key)),
                }
                prop_assert_eq!(table.len(), model.len());
            }
            prop_assert!(table.check_invariants().is_ok());
        }
    }
}
