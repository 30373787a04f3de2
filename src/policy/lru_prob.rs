//! LRU variants that promote on a hit only with some probability.
//!
//! [`LruProb`] promotes with a fixed probability `prob`. [`PredProb`] keeps
//! a per-object `scaler`, starting at 1.0: a hit promotes when a uniform draw
//! falls below the scaler, and every promotion shrinks it to
//! `max(scaler × prob, 0.1)`. Frequently promoted objects therefore become
//! progressively harder to promote again, while a fresh object's first hit
//! always promotes.
//!
//! Both draw from a [`SmallRng`] seeded at construction so runs are
//! reproducible.

use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

/// Lower bound of a [`PredProb`] object's promotion probability.
pub const MIN_SCALER: f64 = 0.1;

macro_rules! prob_params {
    ($name:ident, $policy:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            pub prob: f64,
        }

        impl Default for $name {
            fn default() -> Self {
                Self { prob: 0.5 }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "prob={}", Float(self.prob))
            }
        }

        impl PolicyParams for $name {
            const POLICY: &'static str = $policy;
            const DEFAULTS: &'static str = "prob=0.5";

            fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
                match param.key.as_str() {
                    "prob" => {
                        let prob = param.float(Self::POLICY)?;
                        if !(0.0..=1.0).contains(&prob) {
                            return Err(ConfigError::invalid(
                                Self::POLICY,
                                "prob must be within [0, 1]",
                            ));
                        }
                        self.prob = prob;
                    }
                    _ => return Err(self.unknown(param)),
                }
                Ok(())
            }
        }
    };
}

prob_params!(LruProbParams, "LRUProb");
prob_params!(PredProbParams, "PredProb");

pub struct LruProb {
    core: QueueCore<()>,
    params: LruProbParams,
    rng: SmallRng,
}

impl LruProb {
    pub const NAME: &'static str = "LRUProb";

    pub fn new(capacity: u64, obj_md_size: u64, params: LruProbParams, seed: u64) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl EvictionPolicy for LruProb {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update && self.rng.r#gen::<f64>() < self.params.prob {
            self.core.requeue(id);
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let id = self.core.push_front(req, ());
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

impl fmt::Debug for LruProb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruProb")
            .field("prob", &self.params.prob)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredProbMeta {
    pub scaler: f64,
    pub freq: u64,
}

pub struct PredProb {
    core: QueueCore<PredProbMeta>,
    params: PredProbParams,
    rng: SmallRng,
}

impl PredProb {
    pub const NAME: &'static str = "PredProb";

    pub fn new(capacity: u64, obj_md_size: u64, params: PredProbParams, seed: u64) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            params,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn meta(&self, obj_id: ObjId) -> Option<PredProbMeta> {
        self.core.lookup(obj_id).map(|id| *self.core.meta(id))
    }
}

impl EvictionPolicy for PredProb {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let dice: f64 = self.rng.r#gen();
            if dice < self.core.meta(id).scaler {
                let prob = self.params.prob;
                let meta = self.core.meta_mut(id);
                meta.scaler = (meta.scaler * prob).max(MIN_SCALER);
                meta.freq += 1;
                self.core.requeue(id);
            }
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let meta = PredProbMeta {
            scaler: 1.0,
            freq: 0,
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

impl fmt::Debug for PredProb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredProb")
            .field("prob", &self.params.prob)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}
