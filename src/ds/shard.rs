//! Key-to-shard routing for a multi-process deployment.
//!
//! Each server process owns one shard of the key space. A request for a key
//! owned by another shard is answered with a redirect to that shard's
//! address instead of being served locally.
//!
//! ## Architecture
//!
//! ```text
//!   key ──► FxHasher ──► hash % shards.len() ──► shard index
//!                                                    │
//!                    ┌───────────────────────────────┤
//!                    ▼                               ▼
//!          index == local                     index != local
//!          Route::Local                Route::Redirect(shards[index])
//! ```
//!
//! `FxHasher` is unseeded, so every process in the deployment computes the
//! same shard for a key.
//!
//! ## Example Usage
//!
//! ```
//! use shardkv::ds::{Route, ShardRouter};
//!
//! let router = ShardRouter::new(
//!     vec!["127.0.0.1:7001".into(), "127.0.0.1:7002".into()],
//!     0,
//! )
//! .unwrap();
//!
//! let shard = router.shard_for_key("user:42");
//! match router.route("user:42") {
//!     Route::Local => assert_eq!(shard, 0),
//!     Route::Redirect(addr) => assert_eq!(addr, "127.0.0.1:7002"),
//! }
//! ```

use std::hash::{BuildHasher, BuildHasherDefault};

use rustc_hash::FxHasher;

use crate::error::{ConfigError, ConfigResult};

/// Routing decision for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// The local shard owns the key.
    Local,
    /// Another shard owns the key; carries its address.
    Redirect(&'a str),
}

/// Deterministic `hash(key) mod N` router over a fixed shard list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRouter {
    shards: Vec<String>,
    local: usize,
}

impl ShardRouter {
    /// Creates a router for `shards` where this process serves `local`.
    ///
    /// Fails when `local` is not an index into `shards`.
    pub fn new(shards: Vec<String>, local: usize) -> ConfigResult<Self> {
        if local >= shards.len() {
            return Err(ConfigError::ShardOutOfRange {
                index: local,
                count: shards.len(),
            });
        }
        Ok(Self { shards, local })
    }

    /// Router for a single-process deployment; every key is local.
    pub fn single(addr: impl Into<String>) -> Self {
        Self {
            shards: vec![addr.into()],
            local: 0,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn local_index(&self) -> usize {
        self.local
    }

    /// Address of the shard this process serves.
    pub fn local_addr(&self) -> &str {
        &self.shards[self.local]
    }

    /// Maps `key` to a shard index in `[0, shard_count)`.
    pub fn shard_for_key(&self, key: &str) -> usize {
        let hash = BuildHasherDefault::<FxHasher>::default().hash_one(key);
        (hash % self.shards.len() as u64) as usize
    }

    /// Decides whether `key` is served here or redirected.
    ///
    /// Single-shard deployments and empty keys are always local.
    pub fn route(&self, key: &str) -> Route<'_> {
        if self.shards.len() == 1 || key.is_empty() {
            return Route::Local;
        }
        let shard = self.shard_for_key(key);
        if shard == self.local {
            Route::Local
        } else {
            Route::Redirect(&self.shards[shard])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_shards(local: usize) -> ShardRouter {
        ShardRouter::new(
            vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()],
            local,
        )
        .unwrap()
    }

    #[test]
    fn shard_router_is_deterministic_across_instances() {
        let first = three_shards(0);
        let second = three_shards(2);
        for i in 0..100 {
            let key = format!("key-{i}");
            assert_eq!(first.shard_for_key(&key), second.shard_for_key(&key));
            assert!(first.shard_for_key(&key) < 3);
        }
    }

    #[test]
    fn shard_router_redirects_to_owner() {
        let router = three_shards(1);
        for i in 0..50 {
            let key = format!("k{i}");
            let owner = router.shard_for_key(&key);
            match router.route(&key) {
                Route::Local => assert_eq!(owner, 1),
                Route::Redirect(addr) => {
                    assert_ne!(owner, 1);
                    assert_eq!(addr, ["a:1", "b:2", "c:3"][owner]);
                },
            }
        }
    }

    #[test]
    fn shard_router_single_and_empty_key_are_local() {
        let single = ShardRouter::single("only:1");
        assert_eq!(single.route("anything"), Route::Local);
        assert_eq!(single.local_addr(), "only:1");

        let router = three_shards(0);
        assert_eq!(router.route(""), Route::Local);
    }

    #[test]
    fn shard_router_rejects_out_of_range_index() {
        let err = ShardRouter::new(vec!["a:1".into()], 1).unwrap_err();
        assert!(matches!(err, ConfigError::ShardOutOfRange { index: 1, count: 1 }));
        assert!(ShardRouter::new(Vec::new(), 0).is_err());
    }
}
