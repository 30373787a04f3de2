//! Object-to-shard routing for the sharded policy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │   obj_id                                                            │
//! │     │                                                               │
//! │     ▼                                                               │
//! │   ShardSelector { shards: 4, seed }                                 │
//! │     1. hash seed, then obj_id (DefaultHasher, fixed keys)           │
//! │     2. hasher.finish() % 4                                          │
//! │     │                                                               │
//! │     ▼                                                               │
//! │   ┌─────────┬─────────┬─────────┬─────────┐                         │
//! │   │ shard 0 │ shard 1 │ shard 2 │ shard 3 │  capacity / 4 each      │
//! │   └─────────┴─────────┴─────────┴─────────┘  (at least 1)           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Routing is a pure function of `(obj_id, seed, shards)`, so an object is
//! always looked up in the shard it was inserted into. Nothing consults a
//! second shard.
//!
//! ```
//! use cachesim::ds::ShardSelector;
//!
//! let selector = ShardSelector::new(4, 0);
//! let shard = selector.shard_for(42);
//! assert!(shard < 4);
//! assert_eq!(selector.shard_for(42), shard);
//! assert_eq!(selector.shard_capacity(10), 2);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::request::ObjId;

/// Deterministic obj_id → shard mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
    seed: u64,
}

impl ShardSelector {
    /// Creates a selector for `shards` shards; zero is clamped to one.
    pub fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: shards.max(1),
            seed,
        }
    }

    /// Creates a selector whose shard count never exceeds `capacity`, so
    /// that every shard can hold at least one unit.
    pub fn for_capacity(shards: usize, capacity: u64, seed: u64) -> Self {
        let limit = usize::try_from(capacity).unwrap_or(usize::MAX).max(1);
        Self::new(shards.min(limit), seed)
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Shard index in `[0, shards)` for `obj_id`.
    #[inline]
    pub fn shard_for(&self, obj_id: ObjId) -> usize {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        obj_id.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    /// Capacity of each shard when `total` is split evenly; at least 1.
    #[inline]
    pub fn shard_capacity(&self, total: u64) -> u64 {
        (total / self.shards as u64).max(1)
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new(1, 0)
    }
}
