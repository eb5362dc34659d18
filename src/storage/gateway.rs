//! Thread-safe front of the cache engine.
//!
//! ## Architecture
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────┐
//!   │                      StorageGateway                            │
//!   │                                                                │
//!   │   Arc<Shared> ──────────────────────────────┐                  │
//!   │   ┌──────────────────────────────────────┐  │                  │
//!   │   │ cache: RwLock<PolicyCache<String,    │  │  shared with the │
//!   │   │                           String>>   │  ├─ reclaim thread  │
//!   │   │ stats: StatsCounters (atomics)       │  │                  │
//!   │   └──────────────────────────────────────┘  │                  │
//!   │   reclaimer: Mutex<Option<Reclaimer>> ──────┘                  │
//!   └────────────────────────────────────────────────────────────────┘
//!
//!   size / load / contains   → shared lock
//!   get / put / remove       → exclusive lock
//!   reclaim thread           → exclusive lock, one evict() per acquisition
//! ```
//!
//! `get` takes the exclusive lock: every policy reorders its lists and
//! extends the deadline on a hit.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use shardkv::builder::PolicyKind;
//! use shardkv::storage::{ReclaimConfig, StorageGateway};
//!
//! let gateway = StorageGateway::with_policy(
//!     PolicyKind::Lru,
//!     2,
//!     Duration::from_secs(60),
//!     ReclaimConfig::default(),
//! );
//! gateway.put("a", "1");
//! gateway.put("b", "2");
//! gateway.get("a");
//! gateway.put("c", "3");
//!
//! let report = gateway.reclaim_now();
//! assert_eq!(report.evicted, 1);
//! assert_eq!(gateway.get("b"), None);
//! assert_eq!(gateway.size(), 2);
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::builder::{CacheBuilder, PolicyCache, PolicyKind};
use crate::error::InvariantError;
use crate::storage::load::{Load, resident_memory_kib};
use crate::storage::reclaim::{ReclaimConfig, ReclaimReport, Reclaimer, run_cycle};
use crate::traits::EvictionPolicy;

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removes: u64,
    /// Entries removed by reclamation.
    pub evictions: u64,
    /// Completed reclamation cycles.
    pub cycles: u64,
    /// Cycles that ended with the budget still exceeded.
    pub exhausted: u64,
}

impl GatewayStats {
    /// Hits over lookups, `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removes: AtomicU64,
    evictions: AtomicU64,
    cycles: AtomicU64,
    exhausted: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self, report: &ReclaimReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.evictions
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        if report.exhausted {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// State shared between callers and the reclamation thread.
pub(crate) struct Shared {
    pub(crate) cache: RwLock<PolicyCache<String, String>>,
    pub(crate) stats: StatsCounters,
}

/// Reader-writer-locked wrapper around one policy instance.
pub struct StorageGateway {
    shared: Arc<Shared>,
    reclaim: ReclaimConfig,
    reclaimer: Mutex<Option<Reclaimer>>,
}

impl StorageGateway {
    /// Wraps an already built policy.
    pub fn new(cache: PolicyCache<String, String>, reclaim: ReclaimConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache: RwLock::new(cache),
                stats: StatsCounters::default(),
            }),
            reclaim,
            reclaimer: Mutex::new(None),
        }
    }

    /// Builds the policy named by `kind` and wraps it.
    pub fn with_policy(kind: PolicyKind, capacity: usize, ttl: Duration, reclaim: ReclaimConfig) -> Self {
        let cache = CacheBuilder::new(capacity).ttl(ttl).build(kind);
        Self::new(cache, reclaim)
    }

    pub fn put(&self, key: &str, value: &str) {
        self.shared
            .cache
            .write()
            .put(key.to_owned(), value.to_owned());
        self.shared.stats.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `1` if `key` was resident, `0` otherwise.
    pub fn remove(&self, key: &str) -> usize {
        let removed = self.shared.cache.write().remove(key).is_some();
        if removed {
            self.shared.stats.removes.fetch_add(1, Ordering::Relaxed);
        }
        usize::from(removed)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.shared.cache.write().get(key).cloned();
        self.shared.stats.record_lookup(value.is_some());
        value
    }

    /// Returns `true` if `key` is resident and unexpired. Does not count as a lookup.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.cache.read().contains(key)
    }

    /// Resident entries, including expired ones not yet collected.
    pub fn size(&self) -> usize {
        self.shared.cache.read().len()
    }

    pub fn load(&self) -> Load {
        Load {
            memory_kib: resident_memory_kib(),
            resident: self.size(),
        }
    }

    pub fn policy(&self) -> PolicyKind {
        self.shared.cache.read().kind()
    }

    pub fn capacity(&self) -> usize {
        self.shared.cache.read().capacity()
    }

    pub fn reclaim_config(&self) -> &ReclaimConfig {
        &self.reclaim
    }

    pub fn stats(&self) -> GatewayStats {
        self.shared.stats.snapshot()
    }

    /// Runs one bounded reclamation cycle on the calling thread.
    pub fn reclaim_now(&self) -> ReclaimReport {
        run_cycle(&self.shared, &self.reclaim)
    }

    /// Starts the background reclamation thread; a no-op when already running.
    pub fn start_reclamation(&self) -> io::Result<()> {
        let mut slot = self.reclaimer.lock();
        if slot.is_none() {
            *slot = Some(Reclaimer::spawn(Arc::clone(&self.shared), self.reclaim)?);
        }
        Ok(())
    }

    pub fn is_reclaiming(&self) -> bool {
        self.reclaimer.lock().is_some()
    }

    /// Stops and joins the reclamation thread if it is running.
    pub fn shutdown(&self) {
        let reclaimer = self.reclaimer.lock().take();
        if let Some(reclaimer) = reclaimer {
            reclaimer.stop();
            info!(stats = ?self.stats(), "storage gateway shut down");
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.shared.cache.read().check_invariants()
    }
}

impl Drop for StorageGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageGateway")
            .field("policy", &self.policy())
            .field("size", &self.size())
            .field("reclaim", &self.reclaim)
            .field("reclaiming", &self.is_reclaiming())
            .finish()
    }
}
