//! shardkv: a sharded in-memory key-value cache engine.
//!
//! One process serves one shard. Its entries live in a single replacement
//! policy (LRU, LFU, ARC, 2Q or Random) behind a reader-writer lock, with a
//! background thread that evicts until the configured budget holds.
//!
//! ```text
//!   request ──► ShardRouter ──► Redirect(addr)
//!                   │
//!                   ▼ Local
//!            StorageGateway ◄──── reclaim thread (evict until in budget)
//!                   │
//!                   ▼
//!            PolicyCache ──► IncrementalHashTable + ordering lists
//! ```
//!
//! Start from [`config::ServerConfig`] for a whole process, or from
//! [`builder::CacheBuilder`] for a bare policy.

pub mod builder;
pub mod config;
pub mod ds;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod storage;
pub mod traits;
pub mod ttl;
