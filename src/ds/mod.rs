pub mod ghost_list;
pub mod incremental_table;
pub mod intrusive_list;
pub mod shard;
pub mod slot_arena;

/// Upper bound on entries pre-allocated from a configured capacity; larger
/// structures grow on demand.
pub(crate) const PRESIZE_LIMIT: usize = 1 << 16;

pub use ghost_list::GhostList;
pub use incremental_table::{FxBuildHasher, IncrementalHashTable};
pub use intrusive_list::{IntrusiveList, ListArena};
pub use shard::{Route, ShardRouter};
pub use slot_arena::{SlotArena, SlotId};
