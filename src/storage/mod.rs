//! Storage gateway and the reclamation loop behind it.

pub mod gateway;
pub mod load;
pub mod reclaim;

pub use gateway::{GatewayStats, StorageGateway};
pub use load::{Load, resident_memory_kib};
pub use reclaim::{BudgetTrigger, DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS, ReclaimConfig, ReclaimReport};
