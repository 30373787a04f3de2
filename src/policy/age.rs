//! AGE: a 1-bit CLOCK that only grants a second chance to objects whose
//! last access is recent compared to the expected reuse distance.
//!
//! The cache keeps its own request clock (`vtime`, advanced by every
//! `find`) and miss count. At eviction time the running miss ratio gives
//!
//! ```text
//!   erd = capacity / (miss / vtime)
//! ```
//!
//! the number of requests an object is expected to survive in the cache.
//! The tail is requeued only while
//!
//! ```text
//!   freq > 0  &&  vtime − last_access_vtime < erd × scaler
//! ```
//!
//! and each object at most once per `evict` call (`check_time`).
//!
//! ## Parameters
//!
//! | Key      | Default | Meaning                              |
//! |----------|---------|--------------------------------------|
//! | `scaler` | 0.1     | fraction of `erd` an age may reach   |

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::policy::expected_reuse_distance;
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeParams {
    pub scaler: f64,
}

impl Default for AgeParams {
    fn default() -> Self {
        Self { scaler: 0.1 }
    }
}

impl fmt::Display for AgeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scaler={}", Float(self.scaler))
    }
}

impl PolicyParams for AgeParams {
    const POLICY: &'static str = "AGE";
    const DEFAULTS: &'static str = "scaler=0.1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "scaler" => self.scaler = param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgeMeta {
    pub freq: u8,
    pub last_access_vtime: u64,
    pub check_time: u64,
    /// Insertion counter value when the object was last placed at the head.
    pub pos: u64,
}

pub struct Age {
    core: QueueCore<AgeMeta>,
    params: AgeParams,
    vtime: u64,
    miss: u64,
    counter_insert: u64,
}

impl Age {
    pub const NAME: &'static str = "AGE";

    pub fn new(capacity: u64, obj_md_size: u64, params: AgeParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            vtime: 0,
            miss: 0,
            counter_insert: 0,
        }
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<AgeMeta> {
        self.core.lookup(obj_id).map(|id| *self.core.meta(id))
    }

    /// Expected reuse distance under the current miss ratio.
    pub fn expected_reuse_distance(&self) -> f64 {
        let miss_ratio = if self.vtime == 0 {
            0.0
        } else {
            self.miss as f64 / self.vtime as f64
        };
        expected_reuse_distance(self.core.state.capacity, miss_ratio)
    }

    fn retained(&self, meta: &AgeMeta, erd: f64) -> bool {
        if meta.freq == 0 || meta.check_time == self.vtime {
            return false;
        }
        let reuse_age = self.vtime.saturating_sub(meta.last_access_vtime) as f64;
        reuse_age < erd * self.params.scaler
    }
}

impl EvictionPolicy for Age {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        self.vtime += 1;
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let vtime = self.vtime;
            let meta = self.core.meta_mut(id);
            meta.freq = 1;
            meta.last_access_vtime = vtime;
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.miss += 1;
        self.counter_insert += 1;
        let meta = AgeMeta {
            freq: 0,
            last_access_vtime: self.vtime,
            check_time: 0,
            pos: self.counter_insert,
        };
        let id = self.core.push_front(req, meta);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let tail = self.core.tail()?;
        let mut round = 0u8;
        let mut candidate = tail;
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
            self.counter_insert += 1;
            let (vtime, pos) = (self.vtime, self.counter_insert);
            let meta = self.core.meta_mut(tail);
            meta.freq -= 1;
            meta.check_time = vtime;
            meta.pos = pos;
            self.core.requeue(tail);
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

impl fmt::Debug for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Age")
            .field("params", &self.params)
            .field("vtime", &self.vtime)
            .field("miss", &self.miss)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}
