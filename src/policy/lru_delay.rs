//! LRU with delayed promotion.
//!
//! A hit moves the object to the head only if more than `delay-time`
//! insertions happened since the object was inserted or last promoted.
//! Objects hit repeatedly within that window keep their position, which
//! removes most of the queue reordering LRU performs on hot objects.
//!
//! ```text
//!   hit(x):  itime − x.last_promo_itime > delay_time ?
//!              yes → move x to head, x.last_promo_itime = itime
//!              no  → nothing
//! ```
//!
//! `delay-time` is a fraction of the capacity when written as a float and an
//! absolute number of insertions when written as an integer; a resolved
//! delay of zero becomes one.

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Amount, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LruDelayParams {
    pub delay_time: Amount,
}

impl Default for LruDelayParams {
    fn default() -> Self {
        Self {
            delay_time: Amount::Ratio(0.2),
        }
    }
}

impl fmt::Display for LruDelayParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delay-time={}", self.delay_time)
    }
}

impl PolicyParams for LruDelayParams {
    const POLICY: &'static str = "LRU-delay";
    const DEFAULTS: &'static str = "delay-time=0.2";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "delay-time" => self.delay_time = Amount::from_param(param, Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

pub struct LruDelay {
    core: QueueCore<u64>,
    params: LruDelayParams,
    delay_time: u64,
    itime: u64,
}

impl LruDelay {
    pub const NAME: &'static str = "LRU-delay";

    pub fn new(capacity: u64, obj_md_size: u64, params: LruDelayParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            delay_time: params.delay_time.resolve(capacity).max(1),
            params,
            itime: 0,
        }
    }

    pub fn delay_time(&self) -> u64 {
        self.delay_time
    }

    pub fn recency_order(&self) -> Vec<ObjId> {
        self.core
            .queue
            .iter(&self.core.store)
            .map(|id| self.core.store[id].obj_id())
            .collect()
    }
}

impl EvictionPolicy for LruDelay {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update && self.itime - *self.core.meta(id) > self.delay_time {
            *self.core.meta_mut(id) = self.itime;
            self.core.requeue(id);
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.itime += 1;
        let id = self.core.push_front(req, self.itime);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        self.core.tail().map(|id| self.core.obj_ref(id))
    }

    fn evict(&mut self, _req: &Request) {
        self.core.evict_tail();
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        self.core.remove(obj_id)
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }
}

impl fmt::Debug for LruDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruDelay")
            .field("delay_time", &self.delay_time)
            .field("itime", &self.itime)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: u64, params: &str) -> LruDelay {
        LruDelay::new(capacity, 0, LruDelayParams::parse(Some(params)).unwrap())
    }

    fn run(cache: &mut LruDelay, ids: &[u64]) {
        for &id in ids {
            cache.get(&Request::unit(id));
        }
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn delay_resolution() {
            assert_eq!(cache(100, "").delay_time(), 20);
            assert_eq!(cache(100, "delay-time=7").delay_time(), 7);
            assert_eq!(cache(100, "delay-time=0").delay_time(), 1);
            assert_eq!(cache(3, "delay-time=0.1").delay_time(), 1);
        }

        #[test]
        fn hit_within_delay_keeps_position() {
            let mut c = cache(10, "delay-time=2");
            run(&mut c, &[1, 2, 1]);
            assert_eq!(c.recency_order(), vec![2, 1]);
            assert_eq!(c.state().n_promotion, 0);
        }

        #[test]
        fn hit_after_delay_promotes() {
            let mut c = cache(10, "delay-time=2");
            run(&mut c, &[1, 2, 3, 4, 1]);
            assert_eq!(c.recency_order()[0], 1);
            assert_eq!(c.state().n_promotion, 1);
            // promotion restarts the delay
            run(&mut c, &[1]);
            assert_eq!(c.state().n_promotion, 1);
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn unpromoted_hit_is_still_evicted() {
            let mut c = cache(3, "delay-time=10");
            run(&mut c, &[1, 2, 3, 1, 4]);
            assert!(!c.contains(1));
            c.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn params_round_trip() {
            for input in ["delay-time=0.5", "delay-time=12"] {
                let p = LruDelayParams::parse(Some(input)).unwrap();
                assert_eq!(p.to_string(), input);
            }
        }
    }
}
