//! Policy selection and enum dispatch.
//!
//! [`PolicyKind`] names a replacement policy as it appears in configuration;
//! [`PolicyCache`] holds one live policy and forwards every
//! [`EvictionPolicy`] call by `match`, so the storage layer owns a concrete
//! type with no boxing.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use shardkv::builder::{CacheBuilder, PolicyKind};
//! use shardkv::traits::EvictionPolicy;
//!
//! let kind: PolicyKind = "arc".parse().unwrap();
//! let mut cache = CacheBuilder::new(100)
//!     .ttl(Duration::from_secs(30))
//!     .build::<String, String>(kind);
//! cache.put("hello".to_string(), "world".to_string());
//! assert_eq!(cache.get("hello").map(String::as_str), Some("world"));
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{ConfigError, InvariantError};
use crate::policy::{ArcCache, LfuCache, LruCache, RandomCache, TwoQCache};
use crate::traits::EvictionPolicy;

/// Default TTL when none is configured (10 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(36_000);

/// Available eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolicyKind {
    #[default]
    Lru,
    Lfu,
    Arc,
    TwoQ,
    Random,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 5] = [
        PolicyKind::Lru,
        PolicyKind::Lfu,
        PolicyKind::Arc,
        PolicyKind::TwoQ,
        PolicyKind::Random,
    ];

    /// Configuration name of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Lru => "lru",
            PolicyKind::Lfu => "lfu",
            PolicyKind::Arc => "arc",
            PolicyKind::TwoQ => "2q",
            PolicyKind::Random => "random",
        }
    }

    /// Parses `name`, falling back to LRU with a warning when unrecognized.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: ConfigError| {
            warn!(policy = name, error = %err, "falling back to lru");
            PolicyKind::Lru
        })
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "lfu" => Ok(PolicyKind::Lfu),
            "arc" => Ok(PolicyKind::Arc),
            "2q" | "twoq" => Ok(PolicyKind::TwoQ),
            "random" | "rand" => Ok(PolicyKind::Random),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live policy instance, dispatched by `match`.
pub enum PolicyCache<K, V> {
    Lru(LruCache<K, V>),
    Lfu(LfuCache<K, V>),
    Arc(ArcCache<K, V>),
    TwoQ(TwoQCache<K, V>),
    Random(RandomCache<K, V>),
}

macro_rules! dispatch {
    ($self:expr, $cache:ident => $body:expr) => {
        match $self {
            PolicyCache::Lru($cache) => $body,
            PolicyCache::Lfu($cache) => $body,
            PolicyCache::Arc($cache) => $body,
            PolicyCache::TwoQ($cache) => $body,
            PolicyCache::Random($cache) => $body,
        }
    };
}

impl<K, V> PolicyCache<K, V> {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyCache::Lru(_) => PolicyKind::Lru,
            PolicyCache::Lfu(_) => PolicyKind::Lfu,
            PolicyCache::Arc(_) => PolicyKind::Arc,
            PolicyCache::TwoQ(_) => PolicyKind::TwoQ,
            PolicyCache::Random(_) => PolicyKind::Random,
        }
    }
}

impl<K, V> EvictionPolicy<K, V> for PolicyCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn put(&mut self, key: K, value: V) {
        dispatch!(self, cache => cache.put(key, value))
    }

    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        dispatch!(self, cache => cache.get(key))
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        dispatch!(self, cache => cache.remove(key))
    }

    fn evict(&mut self) -> usize {
        dispatch!(self, cache => cache.evict())
    }

    fn needs_eviction(&self) -> bool {
        dispatch!(self, cache => cache.needs_eviction())
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        dispatch!(self, cache => cache.contains(key))
    }

    fn len(&self) -> usize {
        dispatch!(self, cache => cache.len())
    }

    fn capacity(&self) -> usize {
        dispatch!(self, cache => cache.capacity())
    }

    fn ttl(&self) -> Duration {
        dispatch!(self, cache => cache.ttl())
    }

    fn clear(&mut self) {
        dispatch!(self, cache => cache.clear())
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        dispatch!(self, cache => cache.check_invariants())
    }
}

impl<K, V> fmt::Debug for PolicyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, cache => fmt::Debug::fmt(cache, f))
    }
}

/// Builder for [`PolicyCache`] instances.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    capacity: usize,
    ttl: Duration,
    seed: Option<u64>,
}

impl CacheBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ttl: DEFAULT_TTL,
            seed: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fixes the random policy's eviction sequence. Ignored by the others.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build<K, V>(&self, kind: PolicyKind) -> PolicyCache<K, V>
    where
        K: Clone + Eq + Hash,
    {
        let (capacity, ttl) = (self.capacity, self.ttl);
        match kind {
            PolicyKind::Lru => PolicyCache::Lru(LruCache::new(capacity, ttl)),
            PolicyKind::Lfu => PolicyCache::Lfu(LfuCache::new(capacity, ttl)),
            PolicyKind::Arc => PolicyCache::Arc(ArcCache::new(capacity, ttl)),
            PolicyKind::TwoQ => PolicyCache::TwoQ(TwoQCache::new(capacity, ttl)),
            PolicyKind::Random => PolicyCache::Random(match self.seed {
                Some(seed) => RandomCache::with_seed(capacity, ttl, seed),
                None => RandomCache::new(capacity, ttl),
            }),
        }
    }
}
