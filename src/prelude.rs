pub use crate::builder::{CacheBuilder, PolicyCache, PolicyKind};
pub use crate::config::ServerConfig;
pub use crate::ds::{Route, ShardRouter};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::policy::{ArcCache, LfuCache, LruCache, RandomCache, TwoQCache};
pub use crate::storage::{BudgetTrigger, GatewayStats, ReclaimConfig, StorageGateway};
pub use crate::traits::EvictionPolicy;
