//! PredClock: a 1-bit CLOCK with pluggable retention predicates.
//!
//! Hits only raise the counter of objects that have already travelled
//! `threshold × capacity` insertions down the queue, so objects hit right
//! after insertion do not earn a second chance. At eviction time a tail
//! with its bit set is requeued when the configured predicate agrees:
//!
//! | Mode | Retain the tail when                                             |
//! |------|------------------------------------------------------------------|
//! | 1    | `reuse_age × scaler < erd` (`erd = capacity / miss_ratio`)       |
//! | 2    | always, except every `interval`-th evaluation since the last evict |
//! | 3    | always (plain 1-bit CLOCK with the hit threshold)                |
//!
//! Mode 1 also keeps accuracy counters: an evaluation that rejects the
//! tail is a *negative*; when the request carried its next access time and
//! that access falls inside `erd`, the rejection is a *false negative*.
//! These counters never influence eviction.
//!
//! ## Parameters
//!
//! | Key         | Default | Meaning                                   |
//! |-------------|---------|-------------------------------------------|
//! | `scaler`    | 1.0     | multiplier on the predicted reuse age     |
//! | `mode`      | 3       | retention predicate (1, 2 or 3)           |
//! | `threshold` | 0.1     | insertions (× capacity) before hits count |
//! | `interval`  | 1       | mode 2 rejection period                   |

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::policy::expected_reuse_distance;
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    ReuseAge = 1,
    Interval = 2,
    Always = 3,
}

impl RetentionMode {
    fn from_int(mode: i64) -> Option<Self> {
        match mode {
            1 => Some(Self::ReuseAge),
            2 => Some(Self::Interval),
            3 => Some(Self::Always),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredClockParams {
    pub scaler: f64,
    pub mode: RetentionMode,
    pub threshold: f64,
    pub interval: u64,
}

impl Default for PredClockParams {
    fn default() -> Self {
        Self {
            scaler: 1.0,
            mode: RetentionMode::Always,
            threshold: 0.1,
            interval: 1,
        }
    }
}

impl fmt::Display for PredClockParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scaler={},mode={},threshold={},interval={}",
            Float(self.scaler),
            self.mode as i64,
            Float(self.threshold),
            self.interval
        )
    }
}

impl PolicyParams for PredClockParams {
    const POLICY: &'static str = "PredClock";
    const DEFAULTS: &'static str = "scaler=1.0,mode=3,threshold=0.1,interval=1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "scaler" => self.scaler = param.float(Self::POLICY)?,
            "mode" => {
                let mode = param.int(Self::POLICY)?;
                self.mode = RetentionMode::from_int(mode).ok_or_else(|| {
                    ConfigError::invalid(Self::POLICY, format!("mode {mode} not supported"))
                })?;
            }
            "threshold" => self.threshold = param.float(Self::POLICY)?,
            "interval" => {
                self.interval = param.uint(Self::POLICY)?;
                if self.interval == 0 {
                    return Err(ConfigError::invalid(Self::POLICY, "interval must be positive"));
                }
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredClockMeta {
    pub freq: u8,
    pub hit_freq: u64,
    pub last_access_vtime: u64,
    /// Distance between the last two accesses; `u64::MAX` before any hit.
    pub reuse_dst: u64,
    pub check_time: u64,
    pub pos: u64,
    pub loop_travel_time: u64,
    pub next_access_vtime: Option<i64>,
}

pub struct PredClock {
    core: QueueCore<PredClockMeta>,
    params: PredClockParams,
    vtime: u64,
    miss: u64,
    counter_insert: u64,
    num_reinsert: u64,
    false_negative: u64,
    total_negative: u64,
}

impl PredClock {
    pub const NAME: &'static str = "PredClock";

    pub fn new(capacity: u64, obj_md_size: u64, params: PredClockParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            vtime: 0,
            miss: 0,
            counter_insert: 0,
            num_reinsert: 0,
            false_negative: 0,
            total_negative: 0,
        }
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<PredClockMeta> {
        self.core.lookup(obj_id).map(|id| *self.core.meta(id))
    }

    /// Mode 1 rejections whose next access was within the expected reuse distance.
    pub fn false_negative(&self) -> u64 {
        self.false_negative
    }

    /// Mode 1 rejections.
    pub fn total_negative(&self) -> u64 {
        self.total_negative
    }

    pub fn false_negative_rate(&self) -> f64 {
        if self.total_negative == 0 {
            0.0
        } else {
            self.false_negative as f64 / self.total_negative as f64
        }
    }

    fn expected_reuse_distance(&self) -> f64 {
        let miss_ratio = if self.vtime == 0 {
            0.0
        } else {
            self.miss as f64 / self.vtime as f64
        };
        expected_reuse_distance(self.core.state.capacity, miss_ratio)
    }

    fn retained(&mut self, meta: &PredClockMeta, erd: f64) -> bool {
        match self.params.mode {
            RetentionMode::ReuseAge => {
                if meta.freq == 0 {
                    return false;
                }
                let reuse_age = self.vtime.saturating_sub(meta.last_access_vtime);
                let prediction = reuse_age as f64 * self.params.scaler;
                if prediction < erd {
                    return true;
                }
                if let Some(next) = meta.next_access_vtime {
                    // vtime counts the current request, trace positions start at 0
                    let actual = next.saturating_sub(self.vtime as i64 - 1);
                    if (actual as f64) < erd {
                        self.false_negative += 1;
                    }
                }
                self.total_negative += 1;
                false
            }
            RetentionMode::Interval => {
                let interval = self.params.interval;
                let reject = self.num_reinsert % interval == interval - 1;
                self.num_reinsert += 1;
                !reject
            }
            RetentionMode::Always => true,
        }
    }
}

impl EvictionPolicy for PredClock {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        self.vtime += 1;
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let vtime = self.vtime;
            let aged = self.counter_insert.saturating_sub(self.core.meta(id).pos) as f64
                >= self.params.threshold * self.core.state.capacity as f64;
            let meta = self.core.meta_mut(id);
            if meta.freq < 1 && aged {
                meta.freq += 1;
            }
            meta.hit_freq += 1;
            meta.reuse_dst = vtime - meta.last_access_vtime;
            meta.last_access_vtime = vtime;
            meta.next_access_vtime = req.next_access_vtime;
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.miss += 1;
        self.counter_insert += 1;
        let meta = PredClockMeta {
            freq: 0,
            hit_freq: 0,
            last_access_vtime: self.vtime,
            reuse_dst: u64::MAX,
            check_time: 0,
            pos: self.counter_insert,
            loop_travel_time: 0,
            next_access_vtime: req.next_access_vtime,
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
            let meta = *self.core.meta(tail);
            let retained = self.retained(&meta, erd);
            if !(meta.freq > 0 && retained && meta.check_time != self.vtime) {
                self.num_reinsert = 0;
                self.core.evict_slot(tail);
                return;
            }
            self.counter_insert += 1;
            let (vtime, pos) = (self.vtime, self.counter_insert);
            let meta = self.core.meta_mut(tail);
            meta.freq -= 1;
            meta.loop_travel_time += 1;
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

impl fmt::Debug for PredClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredClock")
            .field("params", &self.params)
            .field("vtime", &self.vtime)
            .field("false_negative", &self.false_negative)
            .field("total_negative", &self.total_negative)
            .finish_non_exhaustive()
    }
}
