//! Random-eviction family.
//!
//! - [`Random`]: evicts a uniformly sampled resident.
//! - [`RandomK`]: samples `k` residents (with replacement) and evicts the one
//!   accessed least recently; `k = 1` is [`Random`].
//! - [`RandomBelady`]: random eviction plus an oracle admission filter.
//!   With `threshold = capacity / miss_ratio × scaler`, a request whose next
//!   access lies beyond `threshold` is not admitted on a miss and is dropped
//!   right after being served on a hit. `scaler = 0` disables the filter for
//!   objects that are reused at all.
//!
//! All samples come from a [`SmallRng`] seeded at construction. `to_evict`
//! samples from a copy of it, so the following `evict` removes the same
//! object.
//!
//! ```text
//!   store arena  [ s0 | s1 | s2 | s3 | s4 ]     sample() → uniform slot
//!   RandomK, k=3:  draw s3, s0, s4 → evict min(last_access_vtime)
//! ```

use std::fmt;

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::ds::SlotId;
use crate::error::{ConfigError, InvariantError};
use crate::params::{Float, Param, PolicyParams};
use crate::policy::{distance_to_next, expected_reuse_distance};
use crate::request::{NEVER, ObjId, ObjectRef, Request};
use crate::store::ObjectStore;
use crate::traits::{CacheState, EvictionPolicy};

/// Store plus RNG; the family keeps no queue.
struct SampledCore<M> {
    state: CacheState,
    store: ObjectStore<M>,
    rng: SmallRng,
}

impl<M> SampledCore<M> {
    fn new(capacity: u64, obj_md_size: u64, seed: u64) -> Self {
        Self {
            state: CacheState::new(capacity, obj_md_size),
            store: ObjectStore::new(obj_md_size),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self) -> Option<SlotId> {
        self.store.sample(&mut self.rng)
    }

    /// The slot the next [`SampledCore::sample`] will return, leaving the
    /// RNG untouched.
    fn peek_sample(&self) -> Option<SlotId> {
        self.store.sample(&mut self.rng.clone())
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        match self.store.lookup(obj_id) {
            Some(id) => self.store.remove(id).is_some(),
            None => false,
        }
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.store.check_invariants()?;
        if self.store.occupied_bytes() > self.state.capacity {
            return Err(InvariantError::new(format!(
                "occupied {} exceeds capacity {}",
                self.store.occupied_bytes(),
                self.state.capacity
            )));
        }
        Ok(())
    }
}

macro_rules! delegate_to_sampled {
    () => {
        fn state(&self) -> &CacheState {
            &self.core.state
        }

        fn state_mut(&mut self) -> &mut CacheState {
            &mut self.core.state
        }

        fn remove(&mut self, obj_id: ObjId) -> bool {
            self.core.remove(obj_id)
        }

        fn contains(&self, obj_id: ObjId) -> bool {
            self.core.store.contains(obj_id)
        }

        fn occupied_bytes(&self) -> u64 {
            self.core.store.occupied_bytes()
        }

        fn n_obj(&self) -> u64 {
            self.core.store.len() as u64
        }

        fn check_invariants(&self) -> Result<(), InvariantError> {
            self.core.check_invariants()
        }
    };
}

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

pub struct Random {
    core: SampledCore<()>,
}

impl Random {
    pub const NAME: &'static str = "Random";

    pub fn new(capacity: u64, obj_md_size: u64, seed: u64) -> Self {
        Self {
            core: SampledCore::new(capacity, obj_md_size, seed),
        }
    }
}

impl EvictionPolicy for Random {
    delegate_to_sampled!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, _update: bool) -> Option<ObjectRef> {
        let id = self.core.store.lookup(req.obj_id)?;
        Some(self.core.store[id].as_ref())
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let id = self.core.store.insert(req, ());
        Some(self.core.store[id].as_ref())
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let id = self.core.peek_sample()?;
        Some(self.core.store[id].as_ref())
    }

    fn evict(&mut self, _req: &Request) {
        if let Some(id) = self.core.sample() {
            self.core.store.remove(id);
        }
    }

    fn current_params(&self) -> String {
        String::new()
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Random")
            .field("n_obj", &self.core.store.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// RandomK
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomKParams {
    pub k: u32,
}

impl Default for RandomKParams {
    fn default() -> Self {
        Self { k: 1 }
    }
}

impl fmt::Display for RandomKParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k={}", self.k)
    }
}

impl PolicyParams for RandomKParams {
    const POLICY: &'static str = "RandomK";
    const DEFAULTS: &'static str = "k=1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "k" => {
                let k = param.uint(Self::POLICY)?;
                if k == 0 {
                    return Err(ConfigError::invalid(Self::POLICY, "k must be positive"));
                }
                self.k = u32::try_from(k)
                    .map_err(|_| ConfigError::invalid(Self::POLICY, "k is too large"))?;
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKMeta {
    pub last_access_vtime: u64,
    pub freq: u64,
}

pub struct RandomK {
    core: SampledCore<RandomKMeta>,
    params: RandomKParams,
}

impl RandomK {
    pub const NAME: &'static str = "RandomK";

    pub fn new(capacity: u64, obj_md_size: u64, params: RandomKParams, seed: u64) -> Self {
        Self {
            core: SampledCore::new(capacity, obj_md_size, seed),
            params,
        }
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<RandomKMeta> {
        self.core.store.lookup(obj_id).map(|id| self.core.store[id].meta)
    }

    /// Least recently accessed of `k` samples drawn from `rng`.
    fn select(store: &ObjectStore<RandomKMeta>, k: u32, rng: &mut SmallRng) -> Option<SlotId> {
        let mut victim = store.sample(rng)?;
        for _ in 1..k {
            let Some(candidate) = store.sample(rng) else {
                break;
            };
            if store[candidate].meta.last_access_vtime < store[victim].meta.last_access_vtime {
                victim = candidate;
            }
        }
        Some(victim)
    }
}

impl EvictionPolicy for RandomK {
    delegate_to_sampled!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.store.lookup(req.obj_id)?;
        if update {
            let n_req = self.core.state.n_req;
            let meta = &mut self.core.store[id].meta;
            meta.last_access_vtime = n_req;
            meta.freq += 1;
        }
        Some(self.core.store[id].as_ref())
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let meta = RandomKMeta {
            last_access_vtime: self.core.state.n_req,
            freq: 0,
        };
        let id = self.core.store.insert(req, meta);
        Some(self.core.store[id].as_ref())
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let id = Self::select(&self.core.store, self.params.k, &mut self.core.rng.clone())?;
        Some(self.core.store[id].as_ref())
    }

    fn evict(&mut self, _req: &Request) {
        if let Some(id) = Self::select(&self.core.store, self.params.k, &mut self.core.rng) {
            self.core.store.remove(id);
        }
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }
}

impl fmt::Debug for RandomK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomK")
            .field("k", &self.params.k)
            .field("n_obj", &self.core.store.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// RandomBelady
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomBeladyParams {
    pub scaler: f64,
}

impl Default for RandomBeladyParams {
    fn default() -> Self {
        Self { scaler: 1.5 }
    }
}

impl fmt::Display for RandomBeladyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scaler={}", Float(self.scaler))
    }
}

impl PolicyParams for RandomBeladyParams {
    const POLICY: &'static str = "RandomBelady";
    const DEFAULTS: &'static str = "scaler=1.5";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "scaler" => self.scaler = param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

pub struct RandomBelady {
    core: SampledCore<u64>,
    params: RandomBeladyParams,
    n_dropped: u64,
}

impl RandomBelady {
    pub const NAME: &'static str = "RandomBelady";

    pub fn new(capacity: u64, obj_md_size: u64, params: RandomBeladyParams, seed: u64) -> Self {
        Self {
            core: SampledCore::new(capacity, obj_md_size, seed),
            params,
            n_dropped: 0,
        }
    }

    /// Hits dropped because the object is not reused soon enough.
    pub fn n_dropped(&self) -> u64 {
        self.n_dropped
    }

    /// Distance beyond which an object is not worth keeping.
    pub fn threshold(&self) -> f64 {
        if self.params.scaler == 0.0 {
            return f64::INFINITY;
        }
        let erd = expected_reuse_distance(self.core.state.capacity, self.core.state.miss_ratio());
        erd * self.params.scaler
    }

    fn not_worth_keeping(&self, req: &Request) -> bool {
        let next = req.next_access_or_never();
        if next == NEVER {
            return true;
        }
        let distance = distance_to_next(next, self.core.state.n_req);
        distance as f64 > self.threshold()
    }
}

impl EvictionPolicy for RandomBelady {
    delegate_to_sampled!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires_oracle(&self) -> bool {
        true
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.store.lookup(req.obj_id)?;
        let obj = self.core.store[id].as_ref();
        if update {
            if self.not_worth_keeping(req) {
                self.core.store.remove(id);
                self.n_dropped += 1;
            } else {
                self.core.store[id].meta = self.core.state.n_req;
            }
        }
        Some(obj)
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        if self.not_worth_keeping(req) {
            return None;
        }
        let id = self.core.store.insert(req, self.core.state.n_req);
        Some(self.core.store[id].as_ref())
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let id = self.core.peek_sample()?;
        Some(self.core.store[id].as_ref())
    }

    fn evict(&mut self, _req: &Request) {
        if let Some(id) = self.core.sample() {
            self.core.store.remove(id);
        }
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }
}

impl fmt::Debug for RandomBelady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomBelady")
            .field("params", &self.params)
            .field("n_dropped", &self.n_dropped)
            .finish_non_exhaustive()
    }
}
