//! FrozenHot: LRU that periodically freezes its hottest prefix.
//!
//! The cache alternates between two phases.
//!
//! ```text
//!   Regular ──(2 × capacity requests, enough objects)──► Frozen
//!      ▲                                                    │
//!      └────────(frozen miss ratio drifts > miss-diff)──────┘
//!
//!   Frozen layout:
//!     frozen  [f0 ... fk]          read-only, hits never reorder
//!     dynamic [d0 ... dn]          plain LRU, sole eviction source
//! ```
//!
//! During the regular phase the cache is an LRU that measures its miss
//! ratio over the second `capacity` requests. Construction then cuts
//! `split-point × capacity` objects off the head into the frozen segment
//! and indexes them. Frozen hits cost nothing. Once the miss ratio seen
//! while frozen exceeds the regular one by more than `miss-diff`, the
//! frozen segment is spliced back in front of the dynamic part and the
//! cache returns to the regular phase.
//!
//! `split-point = 0` disables freezing entirely.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::ds::{IntrusiveList, SlotId};
use crate::error::{ConfigError, InvariantError};
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::QueueCore;
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::{CacheState, EvictionPolicy, serve_request};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenHotParams {
    pub split_point: f64,
    pub miss_diff: f64,
}

impl Default for FrozenHotParams {
    fn default() -> Self {
        Self {
            split_point: 0.0,
            miss_diff: 0.0001,
        }
    }
}

impl fmt::Display for FrozenHotParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "split-point={},miss-diff={}",
            Float(self.split_point),
            Float(self.miss_diff)
        )
    }
}

impl PolicyParams for FrozenHotParams {
    const POLICY: &'static str = "FrozenHot";
    const DEFAULTS: &'static str = "split-point=0.0,miss-diff=0.0001";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "split-point" => {
                let point = param.float(Self::POLICY)?;
                if !(0.0..=1.0).contains(&point) {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "split-point must be within [0, 1]",
                    ));
                }
                self.split_point = point;
            }
            "miss-diff" => self.miss_diff = param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Regular,
    Frozen,
}

pub struct FrozenHot {
    core: QueueCore<()>,
    params: FrozenHotParams,
    split_obj: u64,
    frozen: IntrusiveList,
    frozen_index: FxHashSet<ObjId>,
    phase: Phase,
    regular_access: u64,
    regular_miss: u64,
    regular_miss_ratio: f64,
    frozen_access: u64,
    frozen_miss: u64,
    n_construction: u64,
    n_deconstruction: u64,
}

impl FrozenHot {
    pub const NAME: &'static str = "FrozenHot";

    pub fn new(capacity: u64, obj_md_size: u64, params: FrozenHotParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            split_obj: (capacity as f64 * params.split_point) as u64,
            params,
            frozen: IntrusiveList::new(),
            frozen_index: FxHashSet::default(),
            phase: Phase::Regular,
            regular_access: 0,
            regular_miss: 0,
            regular_miss_ratio: 0.0,
            frozen_access: 0,
            frozen_miss: 0,
            n_construction: 0,
            n_deconstruction: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_frozen(&self, obj_id: ObjId) -> bool {
        self.frozen_index.contains(&obj_id)
    }

    pub fn n_frozen(&self) -> usize {
        self.frozen.len()
    }

    pub fn n_construction(&self) -> u64 {
        self.n_construction
    }

    pub fn n_deconstruction(&self) -> u64 {
        self.n_deconstruction
    }

    /// Miss ratio measured during the last regular phase.
    pub fn regular_miss_ratio(&self) -> f64 {
        self.regular_miss_ratio
    }

    fn regular_get(&mut self, req: &Request) -> bool {
        self.regular_access += 1;
        let capacity = self.core.state.capacity;
        let hit = serve_request(self, req);
        if !hit && self.regular_access > capacity {
            self.regular_miss += 1;
        }
        if self.split_obj > 0
            && self.regular_access >= 2 * capacity
            && self.core.n_obj() >= self.split_obj
        {
            self.construct();
        }
        hit
    }

    fn frozen_get(&mut self, req: &Request) -> bool {
        self.frozen_access += 1;
        let hit = if self.frozen_index.contains(&req.obj_id) {
            let state = &mut self.core.state;
            state.n_req += 1;
            state.n_req_byte += req.obj_size;
            true
        } else {
            serve_request(self, req)
        };
        if !hit {
            self.frozen_miss += 1;
        }

        let frozen_miss_ratio = self.frozen_miss as f64 / self.frozen_access as f64;
        if frozen_miss_ratio - self.regular_miss_ratio > self.params.miss_diff
            && self.frozen_access > self.core.state.capacity
        {
            self.deconstruct();
        }
        hit
    }

    fn construct(&mut self) {
        let measured = self.regular_access.saturating_sub(self.core.state.capacity);
        self.regular_miss_ratio = if measured == 0 {
            0.0
        } else {
            self.regular_miss as f64 / measured as f64
        };
        self.regular_access = 0;
        self.regular_miss = 0;

        // the dynamic part keeps at least one object to evict from
        let n = (self.split_obj as usize).min(self.core.queue.len().saturating_sub(1));
        self.frozen = self.core.queue.split_front(&mut self.core.store, n);
        self.frozen_index = self
            .frozen
            .iter(&self.core.store)
            .map(|id| self.core.store[id].obj_id())
            .collect();

        self.phase = Phase::Frozen;
        self.frozen_access = 0;
        self.frozen_miss = 0;
        self.n_construction += 1;
        tracing::debug!(
            n_frozen = self.frozen.len(),
            regular_miss_ratio = self.regular_miss_ratio,
            "frozen segment constructed"
        );
    }

    fn deconstruct(&mut self) {
        let frozen = std::mem::take(&mut self.frozen);
        self.core.queue.splice_front(&mut self.core.store, frozen);
        self.frozen_index.clear();
        self.regular_access = 0;
        self.regular_miss = 0;
        self.phase = Phase::Regular;
        self.n_deconstruction += 1;
        tracing::debug!(
            frozen_access = self.frozen_access,
            frozen_miss = self.frozen_miss,
            "frozen segment released"
        );
    }

    fn frozen_slot(&self, obj_id: ObjId) -> Option<SlotId> {
        if self.frozen_index.contains(&obj_id) {
            self.core.lookup(obj_id)
        } else {
            None
        }
    }
}

impl EvictionPolicy for FrozenHot {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &CacheState {
        &self.core.state
    }

    fn state_mut(&mut self) -> &mut CacheState {
        &mut self.core.state
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update && !self.frozen_index.contains(&req.obj_id) {
            self.core.requeue(id);
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let id = self.core.push_front(req, ());
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        self.core
            .tail()
            .or_else(|| self.frozen.tail())
            .map(|id| self.core.obj_ref(id))
    }

    fn evict(&mut self, _req: &Request) {
        // variable sizes can drain the dynamic part while frozen
        if self.core.queue.is_empty() && !self.frozen.is_empty() {
            self.deconstruct();
        }
        self.core.evict_tail();
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        if let Some(id) = self.frozen_slot(obj_id) {
            self.frozen.unlink(&mut self.core.store, id);
            self.frozen_index.remove(&obj_id);
            return self.core.store.remove(id).is_some();
        }
        self.core.remove(obj_id)
    }

    fn contains(&self, obj_id: ObjId) -> bool {
        self.core.store.contains(obj_id)
    }

    fn occupied_bytes(&self) -> u64 {
        self.core.occupied_bytes()
    }

    fn n_obj(&self) -> u64 {
        self.core.n_obj()
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.core.queue.check_invariants(&self.core.store)?;
        self.frozen.check_invariants(&self.core.store)?;
        self.core.store.check_invariants()?;
        let linked = self.core.queue.len() + self.frozen.len();
        if linked != self.core.store.len() {
            return Err(InvariantError::new(format!(
                "segments link {} objects, store holds {}",
                linked,
                self.core.store.len()
            )));
        }
        if self.frozen_index.len() != self.frozen.len() {
            return Err(InvariantError::new(format!(
                "frozen index holds {} ids for {} frozen objects",
                self.frozen_index.len(),
                self.frozen.len()
            )));
        }
        if self.phase == Phase::Regular && !self.frozen.is_empty() {
            return Err(InvariantError::new("frozen objects outside the frozen phase"));
        }
        if self.core.occupied_bytes() > self.core.state.capacity {
            return Err(InvariantError::new(format!(
                "occupied {} exceeds capacity {}",
                self.core.occupied_bytes(),
                self.core.state.capacity
            )));
        }
        Ok(())
    }

    fn get(&mut self, req: &Request) -> bool {
        match self.phase {
            Phase::Regular => self.regular_get(req),
            Phase::Frozen => self.frozen_get(req),
        }
    }
}

impl fmt::Debug for FrozenHot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenHot")
            .field("params", &self.params)
            .field("phase", &self.phase)
            .field("n_frozen", &self.frozen.len())
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: u64, params: &str) -> FrozenHot {
        FrozenHot::new(capacity, 0, FrozenHotParams::parse(Some(params)).unwrap())
    }

    fn run(cache: &mut FrozenHot, ids: &[u64]) -> u64 {
        ids.iter().filter(|&&id| cache.get(&Request::unit(id))).count() as u64
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn zero_split_behaves_as_lru() {
            let mut c = cache(3, "");
            run(&mut c, &[1, 2, 3, 1, 4, 1, 2, 3, 4, 5, 6, 7]);
            assert_eq!(c.phase(), Phase::Regular);
            assert_eq!(c.n_construction(), 0);
            c.check_invariants().unwrap();
        }

        #[test]
        fn construction_after_two_capacities() {
            let mut c = cache(4, "split-point=0.5");
            // 8 requests = 2 × capacity
            run(&mut c, &[1, 2, 3, 4, 1, 2, 3, 4]);
            assert_eq!(c.phase(), Phase::Frozen);
            assert_eq!(c.n_frozen(), 2);
            // the two most recent objects are frozen
            assert!(c.is_frozen(4));
            assert!(c.is_frozen(3));
            assert_eq!(c.regular_miss_ratio(), 0.0);
            c.check_invariants().unwrap();
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn frozen_hits_do_not_reorder_and_are_never_evicted() {
            let mut c = cache(4, "split-point=0.5,miss-diff=1.0");
            run(&mut c, &[1, 2, 3, 4, 1, 2, 3, 4]);
            let promotions = c.state().n_promotion;
            assert!(c.get(&Request::unit(4)));
            assert_eq!(c.state().n_promotion, promotions);
            run(&mut c, &[10, 11, 12, 13]);
            assert!(c.contains(3));
            assert!(c.contains(4));
            assert!(!c.contains(1));
            assert_eq!(c.n_obj(), 4);
            c.check_invariants().unwrap();
        }

        #[test]
        fn miss_ratio_drift_releases_frozen_segment() {
            let mut c = cache(4, "split-point=0.5");
            run(&mut c, &[1, 2, 3, 4, 1, 2, 3, 4]);
            assert_eq!(c.phase(), Phase::Frozen);
            // a scan misses on every request; drift exceeds miss-diff
            run(&mut c, &[20, 21, 22, 23, 24]);
            assert_eq!(c.phase(), Phase::Regular);
            assert_eq!(c.n_deconstruction(), 1);
            assert_eq!(c.n_frozen(), 0);
            c.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn remove_reaches_frozen_objects() {
            let mut c = cache(4, "split-point=0.5,miss-diff=1.0");
            run(&mut c, &[1, 2, 3, 4, 1, 2, 3, 4]);
            assert!(c.remove(4));
            assert!(!c.is_frozen(4));
            assert!(!c.contains(4));
            assert!(c.remove(1));
            assert!(!c.remove(99));
            c.check_invariants().unwrap();
        }

        #[test]
        fn dynamic_part_keeps_an_object_at_full_split() {
            let mut c = cache(2, "split-point=1.0,miss-diff=1.0");
            run(&mut c, &[1, 2, 1, 2]);
            assert_eq!(c.phase(), Phase::Frozen);
            assert_eq!(c.n_frozen(), 1);
            run(&mut c, &[5, 6, 7]);
            assert_eq!(c.n_obj(), 2);
            c.check_invariants().unwrap();
        }

        #[test]
        fn params_round_trip() {
            let p = FrozenHotParams::parse(Some("split-point=0.3,miss-diff=0.01")).unwrap();
            assert_eq!(p.to_string(), "split-point=0.3,miss-diff=0.01");
            assert!(FrozenHotParams::parse(Some("split-point=1.5")).is_err());
        }
    }
}
