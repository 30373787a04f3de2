//! PredDelay: LRU that delays a promotion until the object would otherwise
//! be at risk before its known next access.
//!
//! Requests must carry `next_access_vtime`. On a hit the policy compares
//!
//! ```text
//!   remain_life  = itime − last_promo_itime           (insertions since promotion)
//!   waiting_time = distance_to_next_access × miss_ratio
//! ```
//!
//! The waiting time converts the request distance to the next access into
//! insertions using the assumed miss ratio. The object is promoted only when
//! it has already drifted further than it can afford to wait.

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::policy::distance_to_next;
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredDelayParams {
    pub miss_ratio: f64,
}

impl Default for PredDelayParams {
    fn default() -> Self {
        Self { miss_ratio: 0.35 }
    }
}

impl fmt::Display for PredDelayParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "miss-ratio={}", Float(self.miss_ratio))
    }
}

impl PolicyParams for PredDelayParams {
    const POLICY: &'static str = "PredDelay";
    const DEFAULTS: &'static str = "miss-ratio=0.35";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "miss-ratio" => {
                let ratio = param.float(Self::POLICY)?;
                if !(0.0..=1.0).contains(&ratio) {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "miss-ratio must be within [0, 1]",
                    ));
                }
                self.miss_ratio = ratio;
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredDelayMeta {
    pub last_promo_itime: u64,
    pub last_hit_itime: u64,
}

pub struct PredDelay {
    core: QueueCore<PredDelayMeta>,
    params: PredDelayParams,
    itime: u64,
}

impl PredDelay {
    pub const NAME: &'static str = "PredDelay";

    pub fn new(capacity: u64, obj_md_size: u64, params: PredDelayParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            itime: 0,
        }
    }
}

impl EvictionPolicy for PredDelay {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires_oracle(&self) -> bool {
        true
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let itime = self.itime;
            let remain_life = itime - self.core.meta(id).last_promo_itime;
            let distance = distance_to_next(req.next_access_or_never(), self.core.state.n_req);
            let waiting = distance as f64 * self.params.miss_ratio;
            let meta = self.core.meta_mut(id);
            meta.last_hit_itime = itime;
            if (remain_life as f64) < waiting {
                meta.last_promo_itime = itime;
                self.core.requeue(id);
            }
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.itime += 1;
        let meta = PredDelayMeta {
            last_promo_itime: self.itime,
            last_hit_itime: self.itime,
        };
        let id = self.core.push_front(req, meta);
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

impl fmt::Debug for PredDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredDelay")
            .field("params", &self.params)
            .field("itime", &self.itime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod eviction {
        use super::*;

        #[test]
        fn distant_reuse_after_drift_promotes() {
            let mut cache = PredDelay::new(3, 0, PredDelayParams { miss_ratio: 1.0 });
            cache.get(&Request::unit(1));
            cache.get(&Request::unit(2));
            cache.get(&Request::unit(3));
            // drifted 2 insertions, next access 11 requests away
            assert!(cache.get(&Request::unit(1).with_next_access(14)));
            assert_eq!(cache.state().n_promotion, 1);
            cache.get(&Request::unit(4));
            assert!(cache.contains(1));
            assert!(!cache.contains(2));
        }

        #[test]
        fn imminent_reuse_skips_promotion() {
            let mut cache = PredDelay::new(3, 0, PredDelayParams::default());
            cache.get(&Request::unit(1));
            cache.get(&Request::unit(2));
            cache.get(&Request::unit(3));
            assert!(cache.get(&Request::unit(1).with_next_access(4)));
            assert_eq!(cache.state().n_promotion, 0);
            cache.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn reports_oracle_requirement() {
            assert!(PredDelay::new(3, 0, PredDelayParams::default()).requires_oracle());
            assert!(PredDelayParams::parse(Some("miss-ratio=2.0")).is_err());
        }
    }
}
