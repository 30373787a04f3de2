pub use crate::builder::{CacheBuilder, PolicyKind};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::request::{NEVER, ObjId, ObjectRef, Request};
pub use crate::simulator::{annotate_next_access, simulate, simulate_rounds};
pub use crate::stats::CacheStats;
pub use crate::traits::{CacheState, EvictionPolicy};

#[cfg(feature = "concurrency")]
pub use crate::simulator::simulate_many;
