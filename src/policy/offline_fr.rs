//! offlineFR: FIFO-reinsertion steered by the true next access time.
//!
//! A 1-bit CLOCK whose second chance additionally requires the object to
//! actually be reused soon. Requests must carry `next_access_vtime`. At
//! eviction time
//!
//! ```text
//!   erd = capacity / (miss_ratio + reinsert_ratio) × scaler
//! ```
//!
//! where both ratios are per request, and the tail is requeued while its
//! bit is set and its distance to the next access is finite and `≤ erd`.
//! `scaler = 0` makes `erd` infinite.

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::policy::distance_to_next;
use crate::request::{NEVER, ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineFrParams {
    pub scaler: f64,
}

impl Default for OfflineFrParams {
    fn default() -> Self {
        Self { scaler: 1.5 }
    }
}

impl fmt::Display for OfflineFrParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scaler={}", Float(self.scaler))
    }
}

impl PolicyParams for OfflineFrParams {
    const POLICY: &'static str = "offlineFR";
    const DEFAULTS: &'static str = "scaler=1.5";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "scaler" => self.scaler = param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OfflineFrMeta {
    pub freq: u8,
    pub check_time: u64,
    pub next_access_vtime: i64,
}

pub struct OfflineFr {
    core: QueueCore<OfflineFrMeta>,
    params: OfflineFrParams,
    vtime: u64,
    miss: u64,
    reinsert: u64,
}

impl OfflineFr {
    pub const NAME: &'static str = "offlineFR";

    pub fn new(capacity: u64, obj_md_size: u64, params: OfflineFrParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            vtime: 0,
            miss: 0,
            reinsert: 0,
        }
    }

    pub fn reinsert(&self) -> u64 {
        self.reinsert
    }

    pub fn expected_reuse_distance(&self) -> f64 {
        if self.params.scaler == 0.0 || self.vtime == 0 {
            return f64::INFINITY;
        }
        let ratio = (self.miss + self.reinsert) as f64 / self.vtime as f64;
        if ratio <= 0.0 {
            return f64::INFINITY;
        }
        self.core.state.capacity as f64 / ratio * self.params.scaler
    }

    fn retained(&self, meta: &OfflineFrMeta, erd: f64) -> bool {
        if meta.freq == 0 || meta.check_time == self.vtime {
            return false;
        }
        let distance = distance_to_next(meta.next_access_vtime, self.vtime);
        distance != NEVER && distance as f64 <= erd
    }
}

impl EvictionPolicy for OfflineFr {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires_oracle(&self) -> bool {
        true
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        self.vtime += 1;
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let meta = self.core.meta_mut(id);
            meta.freq = 1;
            meta.next_access_vtime = req.next_access_or_never();
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.miss += 1;
        let meta = OfflineFrMeta {
            freq: 0,
            check_time: 0,
            next_access_vtime: req.next_access_or_never(),
        };
        let id = self.core.push_front(req, meta);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let tail = self.core.tail()?;
        let mut candidate = tail;
        let mut round = 0u8;
        while self.core.meta(candidate).freq.saturating_sub(round) >= 1 {
            candidate = match self.core.queue.prev(&self.core.store, candidate) {
                Some(prev) => prev,
                None => {
                    round += 1;
                    tail
                }
            };
        }
        Some(self.core.obj_ref(candidate))
    }

    fn evict(&mut self, _req: &Request) {
        let erd = self.expected_reuse_distance();
        while let Some(tail) = self.core.tail() {
            if !self.retained(self.core.meta(tail), erd) {
                self.core.evict_slot(tail);
                return;
            }
            let vtime = self.vtime;
            let meta = self.core.meta_mut(tail);
            meta.freq -= 1;
            meta.check_time = vtime;
            self.core.requeue(tail);
            self.reinsert += 1;
        }
        debug_assert!(false, "evict on an empty cache");
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        self.core.remove(obj_id)
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }
}

impl fmt::Debug for OfflineFr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineFr")
            .field("params", &self.params)
            .field("vtime", &self.vtime)
            .field("reinsert", &self.reinsert)
            .finish_non_exhaustive()
    }
}
