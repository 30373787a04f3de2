//! Two-Queue (2Q) eviction.
//!
//! Separates objects seen once from objects seen again. New objects enter
//! the FIFO probation queue A1in; when A1in is over its share they leave it
//! and their ids are remembered in the ghost queue A1out. A miss on an id
//! still in A1out is admitted straight into the LRU main queue Am.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            TwoQ Layout                                  │
//! │                                                                         │
//! │   store: ObjectStore<QueueKind>   (one entry per resident object)       │
//! │                                                                         │
//! │   A1in (FIFO, ain-ratio × C bytes)     Am (LRU, the rest)               │
//! │   head ─► [new] ... [old] ◄── tail     head ─► [hot] ... [cold] ◄── tail│
//! │                          │                                              │
//! │                          ▼ evicted id                                   │
//! │   A1out (ghost ids, aout-ratio × C entries)                             │
//! │   head ─► [id] ... [id] ◄── tail                                        │
//! │                                                                         │
//! │   miss on id ∈ A1out  ──►  insert at Am head                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm
//!
//! ```text
//! FIND(req):   in Am → move to Am head;  in A1in → no change
//! INSERT(req): id in A1out → forget ghost, Am head;  else A1in head
//! EVICT():     A1in over its share (or Am empty) → evict A1in tail, ghost it
//!              otherwise                         → evict Am tail
//! ```
//!
//! ## Parameters
//!
//! | Key          | Default | Meaning                               |
//! |--------------|---------|---------------------------------------|
//! | `ain-ratio`  | 0.25    | A1in share of the capacity (bytes)    |
//! | `aout-ratio` | 0.5     | A1out length as a share of capacity   |
//!
//! ## References
//!
//! - Johnson & Shasha, "2Q: A Low Overhead High Performance Buffer Management
//!   Replacement Algorithm", VLDB 1994

use std::fmt;

use crate::ds::{GhostList, IntrusiveList, SlotId};
use crate::error::{ConfigError, InvariantError};
use crate::params::{Float, Param, PolicyParams};
use crate::request::{ObjId, ObjectRef, Request};
use crate::store::ObjectStore;
use crate::traits::{CacheState, EvictionPolicy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoQParams {
    pub ain_ratio: f64,
    pub aout_ratio: f64,
}

impl Default for TwoQParams {
    fn default() -> Self {
        Self {
            ain_ratio: 0.25,
            aout_ratio: 0.5,
        }
    }
}

impl fmt::Display for TwoQParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ain-ratio={},aout-ratio={}",
            Float(self.ain_ratio),
            Float(self.aout_ratio)
        )
    }
}

impl PolicyParams for TwoQParams {
    const POLICY: &'static str = "TwoQ";
    const DEFAULTS: &'static str = "ain-ratio=0.25,aout-ratio=0.5";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        let value = match param.key.as_str() {
            "ain-ratio" | "aout-ratio" => param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        };
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::invalid(
                Self::POLICY,
                format!("{} must be within [0, 1]", param.key),
            ));
        }
        if param.key == "ain-ratio" {
            self.ain_ratio = value;
        } else {
            self.aout_ratio = value;
        }
        Ok(())
    }
}

/// Which queue a resident object is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Probation,
    Main,
}

pub struct TwoQ {
    state: CacheState,
    store: ObjectStore<QueueKind>,
    ain: IntrusiveList,
    am: IntrusiveList,
    ghost: GhostList,
    ain_bytes: u64,
    ain_capacity: u64,
    params: TwoQParams,
}

impl TwoQ {
    pub const NAME: &'static str = "TwoQ";

    pub fn new(capacity: u64, obj_md_size: u64, params: TwoQParams) -> Self {
        let ghost_len = (params.aout_ratio * capacity as f64) as usize;
        Self {
            state: CacheState::new(capacity, obj_md_size),
            store: ObjectStore::new(obj_md_size),
            ain: IntrusiveList::new(),
            am: IntrusiveList::new(),
            ghost: GhostList::new(ghost_len),
            ain_bytes: 0,
            ain_capacity: (params.ain_ratio * capacity as f64) as u64,
            params,
        }
    }

    /// Queue of a resident object.
    pub fn queue_of(&self, obj_id: ObjId) -> Option<QueueKind> {
        self.store.lookup(obj_id).map(|id| self.store[id].meta)
    }

    pub fn is_ghost(&self, obj_id: ObjId) -> bool {
        self.ghost.contains(obj_id)
    }

    fn charge(&self, id: SlotId) -> u64 {
        self.store[id].obj_size() + self.store.obj_md_size()
    }

    fn drop_slot(&mut self, id: SlotId) {
        match self.store[id].meta {
            QueueKind::Probation => {
                self.ain_bytes -= self.charge(id);
                self.ain.unlink(&mut self.store, id);
            }
            QueueKind::Main => {
                self.am.unlink(&mut self.store, id);
            }
        }
        self.store.remove(id);
    }

    fn victim(&self) -> Option<SlotId> {
        if self.ain_bytes > self.ain_capacity || self.am.is_empty() {
            self.ain.tail().or_else(|| self.am.tail())
        } else {
            self.am.tail()
        }
    }
}

impl EvictionPolicy for TwoQ {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &CacheState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut CacheState {
        &mut self.state
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.store.lookup(req.obj_id)?;
        if update && self.store[id].meta == QueueKind::Main {
            self.am.move_to_front(&mut self.store, id);
            self.state.n_promotion += 1;
        }
        Some(self.store[id].as_ref())
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let id = if self.ghost.remove(req.obj_id) {
            let id = self.store.insert(req, QueueKind::Main);
            self.am.push_front(&mut self.store, id);
            id
        } else {
            let id = self.store.insert(req, QueueKind::Probation);
            self.ain.push_front(&mut self.store, id);
            self.ain_bytes += self.charge(id);
            id
        };
        Some(self.store[id].as_ref())
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        self.victim().map(|id| self.store[id].as_ref())
    }

    fn evict(&mut self, _req: &Request) {
        let Some(id) = self.victim() else {
            debug_assert!(false, "evict on an empty cache");
            return;
        };
        if self.store[id].meta == QueueKind::Probation {
            self.ghost.record(self.store[id].obj_id());
        }
        self.drop_slot(id);
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        match self.store.lookup(obj_id) {
            Some(id) => {
                self.drop_slot(id);
                true
            }
            None => false,
        }
    }

    fn contains(&self, obj_id: ObjId) -> bool {
        self.store.contains(obj_id)
    }

    fn occupied_bytes(&self) -> u64 {
        self.store.occupied_bytes()
    }

    fn n_obj(&self) -> u64 {
        self.store.len() as u64
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.ain.check_invariants(&self.store)?;
        self.am.check_invariants(&self.store)?;
        self.store.check_invariants()?;
        self.ghost.check_invariants()?;
        if self.ain.len() + self.am.len() != self.store.len() {
            return Err(InvariantError::new("queue lengths do not sum to resident count"));
        }
        let ain_bytes: u64 = self.ain.iter(&self.store).map(|id| self.charge(id)).sum();
        if ain_bytes != self.ain_bytes {
            return Err(InvariantError::new(format!(
                "A1in accounts {} bytes, holds {ain_bytes}",
                self.ain_bytes
            )));
        }
        if self.store.occupied_bytes() > self.state.capacity {
            return Err(InvariantError::new("occupied bytes exceed capacity"));
        }
        Ok(())
    }
}

impl fmt::Debug for TwoQ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoQ")
            .field("capacity", &self.state.capacity)
            .field("ain_len", &self.ain.len())
            .field("am_len", &self.am.len())
            .field("ghost_len", &self.ghost.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_q(capacity: u64) -> TwoQ {
        TwoQ::new(capacity, 0, TwoQParams::default())
    }

    fn run(cache: &mut TwoQ, ids: &[u64]) -> Vec<bool> {
        ids.iter().map(|&id| cache.get(&Request::unit(id))).collect()
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn new_objects_enter_probation() {
            let mut cache = two_q(8);
            run(&mut cache, &[1, 1]);
            assert_eq!(cache.queue_of(1), Some(QueueKind::Probation));
            assert_eq!(cache.state().n_promotion, 0);
        }

        #[test]
        fn ghost_hit_is_admitted_to_main() {
            let mut cache = two_q(4);
            // A1in share is 1 object; later inserts push 1 out as a ghost
            run(&mut cache, &[1, 2, 3, 4, 5]);
            assert!(!cache.contains(1));
            assert!(cache.is_ghost(1));
            assert!(!cache.get(&Request::unit(1)));
            assert_eq!(cache.queue_of(1), Some(QueueKind::Main));
            assert!(!cache.is_ghost(1));
            cache.check_invariants().unwrap();
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn scan_does_not_flush_main_queue() {
            let mut cache = two_q(8);
            run(&mut cache, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
            run(&mut cache, &[1, 2, 3]);
            for id in 1..=3 {
                assert_eq!(cache.queue_of(id), Some(QueueKind::Main));
            }
            run(&mut cache, &(100..140).collect::<Vec<_>>());
            for id in 1..=3 {
                assert!(cache.contains(id), "hot object {id} was flushed");
            }
            cache.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn remove_from_either_queue() {
            let mut cache = two_q(4);
            run(&mut cache, &[1, 2, 3, 4, 5, 1]);
            assert!(cache.remove(1));
            assert!(cache.remove(5));
            assert!(!cache.remove(42));
            cache.check_invariants().unwrap();
        }

        #[test]
        fn ratio_out_of_range_is_rejected() {
            assert!(TwoQParams::parse(Some("ain-ratio=1.5")).is_err());
            let params = TwoQParams::parse(Some("aout-ratio=0.1")).unwrap();
            assert_eq!(params.to_string(), "ain-ratio=0.25,aout-ratio=0.1");
        }
    }
}
