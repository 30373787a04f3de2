//! LRU whose promotions are gated by a predicted next access.
//!
//! Both policies here keep a running estimate of the *expected eviction
//! age*: how many requests an object survives between its last placement at
//! the head and its eviction. The estimate is an exponentially weighted
//! average, refreshed only by evictions of objects that were never hit:
//!
//! ```text
//!   eea ← 0.15 × (vtime − obj.insert_time) + 0.85 × eea
//! ```
//!
//! On a hit an object is promoted only if its next access falls inside the
//! window
//!
//! ```text
//!   time_remaining = eea − (vtime − obj.last_promotion_vtime)
//!   time_remaining < dist_next_access < eea
//! ```
//!
//! Past `time_remaining` the object would be evicted before the reuse
//! without a promotion; past `eea` it would be evicted anyway.
//!
//! | Policy          | `dist_next_access`                                    |
//! |-----------------|-------------------------------------------------------|
//! | [`DelayOffline`] | true distance from the request's `next_access_vtime` |
//! | [`DelayOnline`]  | `last_interarrival × percentage × obj.scale`, after which `obj.scale *= percentage` |
//!
//! [`DelayOnline`] also evaluates the oracle window when a request carries
//! `next_access_vtime` and counts disagreements in [`DelayOnline::sum_diff`].

use std::fmt;

use crate::ds::SlotId;
use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::QueueCore;
use crate::policy::distance_to_next;
use crate::request::{NEVER, ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

const EWMA_NEW: f64 = 0.15;
const EWMA_OLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayOfflineParams {
    /// Recorded in the parameter string; the promotion window does not use it.
    pub delay_time: u64,
}

impl Default for DelayOfflineParams {
    fn default() -> Self {
        Self { delay_time: 1 }
    }
}

impl fmt::Display for DelayOfflineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delay-time={}", self.delay_time)
    }
}

impl PolicyParams for DelayOfflineParams {
    const POLICY: &'static str = "Delay_offline";
    const DEFAULTS: &'static str = "delay-time=1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "delay-time" => self.delay_time = param.uint(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayOnlineParams {
    pub percentage: f64,
}

impl Default for DelayOnlineParams {
    fn default() -> Self {
        Self { percentage: 0.9 }
    }
}

impl fmt::Display for DelayOnlineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "percentage={}", Float(self.percentage))
    }
}

impl PolicyParams for DelayOnlineParams {
    const POLICY: &'static str = "Delay_online";
    const DEFAULTS: &'static str = "percentage=0.9";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "percentage" => {
                let value = param.float(Self::POLICY)?;
                if !(value > 0.0 && value <= 1.0) {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "percentage must be within (0, 1]",
                    ));
                }
                self.percentage = value;
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DelayMeta {
    /// Hits since insertion.
    pub freq: u64,
    pub insert_time: u64,
    pub last_hit_vtime: u64,
    pub last_promotion_vtime: u64,
    pub sum_dist: u64,
    pub scale: f64,
}

impl DelayMeta {
    fn new(vtime: u64) -> Self {
        Self {
            freq: 0,
            insert_time: vtime,
            last_hit_vtime: vtime,
            last_promotion_vtime: vtime,
            sum_dist: 0,
            scale: 1.0,
        }
    }

    /// Mean distance between hits.
    pub fn mean_interarrival(&self) -> f64 {
        if self.freq == 0 {
            0.0
        } else {
            self.sum_dist as f64 / self.freq as f64
        }
    }
}

/// Queue, request clock and eviction-age estimate shared by both policies.
#[derive(Debug)]
struct DelayCore {
    core: QueueCore<DelayMeta>,
    vtime: u64,
    expected_eviction_age: f64,
}

impl DelayCore {
    fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            vtime: 0,
            expected_eviction_age: 0.0,
        }
    }

    fn in_window(&self, meta: &DelayMeta, dist: f64) -> bool {
        let eea = self.expected_eviction_age;
        let remaining = eea - self.vtime.saturating_sub(meta.last_promotion_vtime) as f64;
        dist > remaining && dist < eea
    }

    fn promote(&mut self, id: SlotId) {
        let vtime = self.vtime;
        let meta = self.core.meta_mut(id);
        meta.insert_time = vtime;
        meta.last_promotion_vtime = vtime;
        self.core.requeue(id);
    }

    fn insert(&mut self, req: &Request) -> ObjectRef {
        let id = self.core.push_front(req, DelayMeta::new(self.vtime));
        self.core.obj_ref(id)
    }

    fn evict(&mut self) {
        let Some(tail) = self.core.tail() else {
            debug_assert!(false, "evict on an empty cache");
            return;
        };
        let meta = *self.core.meta(tail);
        if meta.freq == 0 {
            let age = self.vtime.saturating_sub(meta.insert_time) as f64;
            self.expected_eviction_age = EWMA_NEW * age + EWMA_OLD * self.expected_eviction_age;
        }
        self.core.evict_slot(tail);
    }
}

macro_rules! delay_policy_common {
    () => {
        fn state(&self) -> &$crate::traits::CacheState {
            &self.inner.core.state
        }

        fn state_mut(&mut self) -> &mut $crate::traits::CacheState {
            &mut self.inner.core.state
        }

        fn contains(&self, obj_id: ObjId) -> bool {
            self.inner.core.store.contains(obj_id)
        }

        fn occupied_bytes(&self) -> u64 {
            self.inner.core.occupied_bytes()
        }

        fn n_obj(&self) -> u64 {
            self.inner.core.n_obj()
        }

        fn check_invariants(&self) -> Result<(), $crate::error::InvariantError> {
            self.inner.core.check_invariants()
        }

        fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
            Some(self.inner.insert(req))
        }

        fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
            self.inner.core.tail().map(|id| self.inner.core.obj_ref(id))
        }

        fn evict(&mut self, _req: &Request) {
            self.inner.evict();
        }

        fn remove(&mut self, obj_id: ObjId) -> bool {
            self.inner.core.remove(obj_id)
        }

        fn current_params(&self) -> String {
            self.params.to_string()
        }
    };
}

pub struct DelayOffline {
    inner: DelayCore,
    params: DelayOfflineParams,
}

impl DelayOffline {
    pub const NAME: &'static str = "Delay_offline";

    pub fn new(capacity: u64, obj_md_size: u64, params: DelayOfflineParams) -> Self {
        Self {
            inner: DelayCore::new(capacity, obj_md_size),
            params,
        }
    }

    pub fn expected_eviction_age(&self) -> f64 {
        self.inner.expected_eviction_age
    }
}

impl EvictionPolicy for DelayOffline {
    delay_policy_common!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires_oracle(&self) -> bool {
        true
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        self.inner.vtime += 1;
        let id = self.inner.core.lookup(req.obj_id)?;
        self.inner.core.meta_mut(id).freq += 1;
        let next = req.next_access_or_never();
        let dist = distance_to_next(next, self.inner.vtime) as f64;
        if update && next != NEVER && self.inner.in_window(self.inner.core.meta(id), dist) {
            self.inner.promote(id);
        }
        Some(self.inner.core.obj_ref(id))
    }
}

impl fmt::Debug for DelayOffline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayOffline")
            .field("vtime", &self.inner.vtime)
            .field("expected_eviction_age", &self.inner.expected_eviction_age)
            .finish_non_exhaustive()
    }
}

pub struct DelayOnline {
    inner: DelayCore,
    params: DelayOnlineParams,
    sum_diff: u64,
}

impl DelayOnline {
    pub const NAME: &'static str = "Delay_online";

    pub fn new(capacity: u64, obj_md_size: u64, params: DelayOnlineParams) -> Self {
        Self {
            inner: DelayCore::new(capacity, obj_md_size),
            params,
            sum_diff: 0,
        }
    }

    pub fn expected_eviction_age(&self) -> f64 {
        self.inner.expected_eviction_age
    }

    /// Hits where the forecast and the oracle disagreed about promoting.
    pub fn sum_diff(&self) -> u64 {
        self.sum_diff
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<DelayMeta> {
        self.inner.core.lookup(obj_id).map(|id| *self.inner.core.meta(id))
    }
}

impl EvictionPolicy for DelayOnline {
    delay_policy_common!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        self.inner.vtime += 1;
        let id = self.inner.core.lookup(req.obj_id)?;
        let (vtime, percentage) = (self.inner.vtime, self.params.percentage);

        let meta = self.inner.core.meta_mut(id);
        let interval = vtime - meta.last_hit_vtime;
        meta.freq += 1;
        meta.sum_dist += interval;
        meta.last_hit_vtime = vtime;
        let forecast = interval as f64 * percentage * meta.scale;
        meta.scale *= percentage;

        let meta = *meta;
        let promote = self.inner.in_window(&meta, forecast);
        if let Some(next) = req.next_access_vtime
            && next != NEVER
        {
            let oracle = distance_to_next(next, vtime) as f64;
            if self.inner.in_window(&meta, oracle) != promote {
                self.sum_diff += 1;
            }
        }
        if update && promote {
            self.inner.promote(id);
        }
        Some(self.inner.core.obj_ref(id))
    }
}

impl fmt::Debug for DelayOnline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayOnline")
            .field("params", &self.params)
            .field("vtime", &self.inner.vtime)
            .field("expected_eviction_age", &self.inner.expected_eviction_age)
            .field("sum_diff", &self.sum_diff)
            .finish_non_exhaustive()
    }
}
