//! Replacement policies.
//!
//! | Policy                 | Ordering structures                  | Ghosts    |
//! |------------------------|--------------------------------------|-----------|
//! | [`LruCache`]           | one recency list                     | -         |
//! | [`LfuCache`]           | sorted frequency buckets             | -         |
//! | [`ArcCache`]           | T1, T2 recency lists + target `p`    | B1, B2    |
//! | [`TwoQCache`]          | A1in FIFO, Am recency list           | A1out     |
//! | [`RandomCache`]        | dense key array                      | -         |
//!
//! All of them implement [`EvictionPolicy`](crate::traits::EvictionPolicy)
//! and keep their key index in an
//! [`IncrementalHashTable`](crate::ds::IncrementalHashTable).

pub mod arc;
pub mod lfu;
pub mod lru;
pub mod random;
pub mod two_q;

pub use arc::ArcCache;
pub use lfu::LfuCache;
pub use lru::LruCache;
pub use random::RandomCache;
pub use two_q::TwoQCache;
