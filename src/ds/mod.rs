pub mod ghost_list;
pub mod intrusive_list;
pub mod shard;
pub mod slot_arena;

pub use ghost_list::GhostList;
pub use intrusive_list::{IntrusiveList, LinkStore, Links};
pub use shard::ShardSelector;
pub use slot_arena::{SlotArena, SlotId};
