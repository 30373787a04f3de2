//! DelayClock: CLOCK whose second chance is gated by access age.
//!
//! Ages are measured in insertions (`itime`). At eviction time the tail is
//! requeued only while
//!
//! ```text
//!   access_age / promote_age < scale
//!   access_age  = itime − last_access_itime
//!   promote_age = itime − last_promote_itime
//! ```
//!
//! so an object is kept only if its last hit happened noticeably after its
//! last requeue. A requeue subtracts `decrease-rate` from the counter and
//! stamps `last_promote_itime`, which makes `promote_age` zero; a zero
//! promote age never qualifies, so an object is requeued at most once per
//! `evict` call.
//!
//! ## Parameters
//!
//! | Key             | Default | Meaning                               |
//! |-----------------|---------|---------------------------------------|
//! | `n-bit-counter` | 1       | counter width                         |
//! | `decrease-rate` | 1       | counter decrement per requeue         |
//! | `scale`         | 1.0     | age-ratio threshold                   |

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayClockParams {
    pub n_bit_counter: u32,
    pub decrease_rate: i64,
    pub scale: f64,
}

impl Default for DelayClockParams {
    fn default() -> Self {
        Self {
            n_bit_counter: 1,
            decrease_rate: 1,
            scale: 1.0,
        }
    }
}

impl fmt::Display for DelayClockParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n-bit-counter={},decrease-rate={},scale={}",
            self.n_bit_counter,
            self.decrease_rate,
            Float(self.scale)
        )
    }
}

impl PolicyParams for DelayClockParams {
    const POLICY: &'static str = "DelayClock";
    const DEFAULTS: &'static str = "n-bit-counter=1,decrease-rate=1,scale=1.0";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "n-bit-counter" => {
                let bits = param.uint(Self::POLICY)?;
                if bits > 16 {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "n-bit-counter must be at most 16",
                    ));
                }
                self.n_bit_counter = bits as u32;
            }
            "decrease-rate" => {
                self.decrease_rate = param.int(Self::POLICY)?;
                if self.decrease_rate < 1 {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "decrease-rate must be positive",
                    ));
                }
            }
            "scale" => self.scale = param.float(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelayClockMeta {
    /// Signed: a large decrease rate may push it below zero.
    pub freq: i64,
    pub last_access_itime: u64,
    pub last_promote_itime: u64,
    pub num_hits: u64,
    pub is_promoted: bool,
}

pub struct DelayClock {
    core: QueueCore<DelayClockMeta>,
    params: DelayClockParams,
    max_freq: i64,
    itime: u64,
}

impl DelayClock {
    pub const NAME: &'static str = "DelayClock";

    pub fn new(capacity: u64, obj_md_size: u64, params: DelayClockParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            max_freq: (1i64 << params.n_bit_counter) - 1,
            params,
            itime: 0,
        }
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<DelayClockMeta> {
        self.core.lookup(obj_id).map(|id| *self.core.meta(id))
    }

    fn qualifies(&self, meta: &DelayClockMeta) -> bool {
        let access_age = self.itime.saturating_sub(meta.last_access_itime) as f64;
        let promote_age = self.itime.saturating_sub(meta.last_promote_itime) as f64;
        if promote_age == 0.0 {
            return false;
        }
        access_age / promote_age < self.params.scale
    }
}

impl EvictionPolicy for DelayClock {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let (itime, max_freq) = (self.itime, self.max_freq);
            let meta = self.core.meta_mut(id);
            meta.last_access_itime = itime;
            meta.num_hits += 1;
            if meta.freq < max_freq {
                meta.freq += 1;
            }
            meta.is_promoted = false;
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.itime += 1;
        let id = self.core.push_front(req, DelayClockMeta::default());
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let tail = self.core.tail()?;
        let mut round = 0i64;
        let mut candidate = tail;
        while self.core.meta(candidate).freq - round >= 1 {
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
        while let Some(tail) = self.core.tail() {
            let meta = *self.core.meta(tail);
            if meta.freq < 0 || !self.qualifies(&meta) {
                self.core.evict_slot(tail);
                return;
            }
            let (itime, rate) = (self.itime, self.params.decrease_rate);
            let meta = self.core.meta_mut(tail);
            meta.freq -= rate;
            meta.last_promote_itime = itime;
            meta.is_promoted = true;
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

impl fmt::Debug for DelayClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayClock")
            .field("params", &self.params)
            .field("itime", &self.itime)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: u64, params: &str) -> DelayClock {
        DelayClock::new(capacity, 0, DelayClockParams::parse(Some(params)).unwrap())
    }

    fn run(cache: &mut DelayClock, ids: &[u64]) {
        for &id in ids {
            cache.get(&Request::unit(id));
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn never_hit_objects_are_not_requeued() {
            // access_age == promote_age, ratio 1.0 is not below scale 1.0
            let mut c = cache(3, "");
            run(&mut c, &[1, 2, 3, 4]);
            assert!(!c.contains(1));
            assert_eq!(c.state().n_promotion, 0);
            c.check_invariants().unwrap();
        }

        #[test]
        fn recently_hit_object_is_requeued_once() {
            let mut c = cache(3, "");
            run(&mut c, &[1, 2, 3, 1, 4]);
            // 1 was hit after 3 insertions: access_age 0, promote_age 3
            assert!(c.contains(1));
            assert!(!c.contains(2));
            let meta = c.meta(1).unwrap();
            assert!(meta.is_promoted);
            assert_eq!(meta.freq, 0);
            assert_eq!(c.state().n_promotion, 1);
        }

        #[test]
        fn generous_scale_still_terminates() {
            let mut c = cache(4, "scale=100.0,n-bit-counter=3");
            for _ in 0..5 {
                run(&mut c, &[1, 2, 3, 4]);
            }
            run(&mut c, &[5, 6, 7, 8, 9]);
            assert_eq!(c.n_obj(), 4);
            c.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn params_round_trip() {
            let p = DelayClockParams::parse(Some("decrease-rate=2,scale=0.5")).unwrap();
            assert_eq!(DelayClockParams::parse(Some(&p.to_string())).unwrap(), p);
            assert_eq!(DelayClockParams::default().to_string(), DelayClockParams::DEFAULTS);
        }

        #[test]
        fn zero_decrease_rate_is_rejected() {
            assert!(DelayClockParams::parse(Some("decrease-rate=0")).is_err());
        }
    }
}
