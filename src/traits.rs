//! # Eviction Policy Contract
//!
//! Every policy in [`crate::policy`] implements [`EvictionPolicy`]: a state
//! machine over `{absent, resident}` per object driven by five primitive
//! operations plus the composite [`EvictionPolicy::get`].
//!
//! ## Architecture
//!
//! ```text
//!                          ┌─────────────────────────────────────────┐
//!                          │           EvictionPolicy                │
//!                          │                                         │
//!                          │  find(&Request, update) → Option<Ref>   │
//!                          │  insert(&Request) → Option<Ref>         │
//!                          │  to_evict(&Request) → Option<Ref>       │
//!                          │  evict(&Request)                        │
//!                          │  remove(ObjId) → bool                   │
//!                          │                                         │
//!                          │  get(&Request) → bool    (provided)     │
//!                          │  can_insert(&Request)    (provided)     │
//!                          │  stats() → CacheStats    (provided)     │
//!                          └──────────────────┬──────────────────────┘
//!                                             │
//!        ┌────────────────┬───────────────────┼───────────────────┬────────────────┐
//!        ▼                ▼                   ▼                   ▼                ▼
//!   single queue     delayed / prob.     segmented          sharded          oracle
//!   Fifo Lru Clock   LruDelay LruProb    FrozenHot          Sharded          Belady
//!   DelayClock AGE   PredProb PredDelay  HotCache           (n × base)       OfflineFr
//!   PredClock Bc     DelayPredict        TwoQ                                RandomBelady
//! ```
//!
//! ## The composite `get`
//!
//! ```text
//!   get(req):
//!     n_req += 1
//!     if find(req, true) is Some:  return HIT
//!     n_miss += 1
//!     if !can_insert(req):         return MISS        (object larger than cache)
//!     while occupied + size + md > capacity:
//!         evict(req)                                  (one object per call)
//!     insert(req)
//!     return MISS
//! ```
//!
//! After every `get`, `occupied_bytes() <= capacity` holds for every policy.
//!
//! ## Unsupported operations
//!
//! Some policies cannot select a victim without mutating state, or wrap a
//! sub-cache whose entries they do not own. Those panic with a message naming
//! the policy and the operation; each policy documents which ones apply.

use std::fmt;

use crate::error::InvariantError;
use crate::request::{ObjId, ObjectRef, Request};
use crate::stats::CacheStats;

/// Configuration and aggregate counters kept by every policy instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheState {
    pub capacity: u64,
    /// Bytes charged per resident object on top of its size.
    pub obj_md_size: u64,
    pub n_req: u64,
    pub n_req_byte: u64,
    pub n_miss: u64,
    pub n_miss_byte: u64,
    pub n_insert: u64,
    pub n_promotion: u64,
    /// Replay round this instance belongs to.
    pub version: u32,
}

impl CacheState {
    pub fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            capacity,
            obj_md_size,
            ..Self::default()
        }
    }

    /// Misses per request so far; `0.0` before the first request.
    #[inline]
    pub fn miss_ratio(&self) -> f64 {
        if self.n_req == 0 {
            0.0
        } else {
            self.n_miss as f64 / self.n_req as f64
        }
    }
}

/// The five-operation policy contract plus the composite `get`.
pub trait EvictionPolicy: fmt::Debug + Send {
    /// Policy name as registered with the builder.
    fn name(&self) -> &'static str;

    fn state(&self) -> &CacheState;

    fn state_mut(&mut self) -> &mut CacheState;

    /// Looks up `req.obj_id`. With `update`, applies the policy's hit
    /// bookkeeping. A miss mutates nothing unless the policy documents
    /// otherwise.
    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef>;

    /// Admits `req`; the caller has already made room. Returns `None` if
    /// the policy declined to admit the object.
    fn insert(&mut self, req: &Request) -> Option<ObjectRef>;

    /// The object `evict` would remove next.
    fn to_evict(&mut self, req: &Request) -> Option<ObjectRef>;

    /// Removes exactly one object, possibly requeueing others first.
    fn evict(&mut self, req: &Request);

    /// Deletes `obj_id` outside the eviction path.
    fn remove(&mut self, obj_id: ObjId) -> bool;

    /// Residency check without side effects.
    fn contains(&self, obj_id: ObjId) -> bool;

    fn occupied_bytes(&self) -> u64;

    fn n_obj(&self) -> u64;

    /// Effective parameter string; parses back to the same configuration.
    fn current_params(&self) -> String;

    /// Whether `req` can ever fit.
    fn can_insert(&self, req: &Request) -> bool {
        let state = self.state();
        req.obj_size + state.obj_md_size <= state.capacity
    }

    /// Whether requests must carry `next_access_vtime`.
    fn requires_oracle(&self) -> bool {
        false
    }

    /// Verifies queue/store agreement and the capacity bound.
    fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.occupied_bytes() > self.state().capacity {
            return Err(InvariantError::new(format!(
                "{} occupies {} of {} bytes",
                self.name(),
                self.occupied_bytes(),
                self.state().capacity
            )));
        }
        Ok(())
    }

    /// Serves one request; returns `true` on a hit.
    fn get(&mut self, req: &Request) -> bool {
        serve_request(self, req)
    }

    /// Snapshot of the counters.
    fn stats(&self) -> CacheStats {
        CacheStats::capture(self)
    }
}

/// The composite `get` flow over the five primitives.
///
/// Policies that override [`EvictionPolicy::get`] to wrap extra bookkeeping
/// around a plain request call this for the shared part.
pub fn serve_request<P: EvictionPolicy + ?Sized>(cache: &mut P, req: &Request) -> bool {
    let state = cache.state_mut();
    state.n_req += 1;
    state.n_req_byte += req.obj_size;

    if cache.find(req, true).is_some() {
        return true;
    }

    let state = cache.state_mut();
    state.n_miss += 1;
    state.n_miss_byte += req.obj_size;

    if !cache.can_insert(req) {
        return false;
    }

    let needed = req.obj_size + cache.state().obj_md_size;
    let capacity = cache.state().capacity;
    while cache.occupied_bytes() + needed > capacity {
        debug_assert!(cache.n_obj() > 0, "{} over capacity while empty", cache.name());
        if cache.n_obj() == 0 {
            break;
        }
        cache.evict(req);
    }

    if cache.insert(req).is_some() {
        cache.state_mut().n_insert += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_ratio_of_fresh_state_is_zero() {
        let state = CacheState::new(10, 0);
        assert_eq!(state.miss_ratio(), 0.0);
    }

    #[test]
    fn miss_ratio_divides_misses_by_requests() {
        let state = CacheState {
            n_req: 8,
            n_miss: 2,
            ..CacheState::new(10, 0)
        };
        assert_eq!(state.miss_ratio(), 0.25);
    }

    #[test]
    fn policy_trait_is_object_safe() {
        fn assert_dyn(_: Option<&dyn EvictionPolicy>) {}
        assert_dyn(None);
    }
}
