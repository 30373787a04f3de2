//! DelayFR: FIFO-reinsertion whose counter only counts spaced-out hits.
//!
//! The policy keeps a logical clock advanced by every insertion and every
//! reinsertion. A hit raises the counter only if more than
//! `delay-ratio × capacity` ticks passed since the last raise, so bursts of
//! hits to a freshly inserted object earn at most one second chance.
//!
//! `evict` performs a single CLOCK step: it either evicts a tail whose
//! counter is zero, or decrements and requeues a non-zero tail and returns
//! without freeing space. The caller's eviction loop retries until enough
//! room is free, which is why the victim cannot be predicted and
//! [`EvictionPolicy::to_evict`] is unsupported.
//!
//! ## Parameters
//!
//! | Key             | Default | Meaning                                |
//! |-----------------|---------|----------------------------------------|
//! | `n-bit-counter` | 1       | counter width                          |
//! | `delay-ratio`   | 0.05    | minimum spacing of counted hits (× capacity) |

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Float, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayFrParams {
    pub n_bit_counter: u32,
    pub delay_ratio: f64,
}

impl Default for DelayFrParams {
    fn default() -> Self {
        Self {
            n_bit_counter: 1,
            delay_ratio: 0.05,
        }
    }
}

impl fmt::Display for DelayFrParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n-bit-counter={},delay-ratio={}",
            self.n_bit_counter,
            Float(self.delay_ratio)
        )
    }
}

impl PolicyParams for DelayFrParams {
    const POLICY: &'static str = "DelayFR";
    const DEFAULTS: &'static str = "n-bit-counter=1,delay-ratio=0.05";

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
            "delay-ratio" => {
                self.delay_ratio = param.float(Self::POLICY)?;
                if self.delay_ratio < 0.0 {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "delay-ratio must not be negative",
                    ));
                }
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelayFrMeta {
    pub freq: u32,
    pub last_reuse_time: u64,
}

pub struct DelayFr {
    core: QueueCore<DelayFrMeta>,
    params: DelayFrParams,
    max_freq: u32,
    delay_time: u64,
    current_time: u64,
}

impl DelayFr {
    pub const NAME: &'static str = "DelayFR";

    pub fn new(capacity: u64, obj_md_size: u64, params: DelayFrParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            max_freq: (1u32 << params.n_bit_counter) - 1,
            delay_time: (params.delay_ratio * capacity as f64) as u64,
            params,
            current_time: 0,
        }
    }

    pub fn delay_time(&self) -> u64 {
        self.delay_time
    }

    pub fn freq(&self, obj_id: ObjId) -> Option<u32> {
        self.core.lookup(obj_id).map(|id| self.core.meta(id).freq)
    }
}

impl EvictionPolicy for DelayFr {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let (now, delay, max_freq) = (self.current_time, self.delay_time, self.max_freq);
            let meta = self.core.meta_mut(id);
            if meta.freq < max_freq && now - meta.last_reuse_time > delay {
                meta.freq += 1;
                meta.last_reuse_time = now;
            }
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.current_time += 1;
        let meta = DelayFrMeta {
            freq: 0,
            last_reuse_time: self.current_time,
        };
        let id = self.core.push_front(req, meta);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        panic!("DelayFR does not support to_evict");
    }

    fn evict(&mut self, _req: &Request) {
        let Some(tail) = self.core.tail() else {
            debug_assert!(false, "evict on an empty cache");
            return;
        };
        let meta = self.core.meta_mut(tail);
        if meta.freq == 0 {
            self.core.evict_slot(tail);
            return;
        }
        meta.freq -= 1;
        self.core.requeue(tail);
        self.current_time += 1;
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        self.core.remove(obj_id)
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }
}

impl fmt::Debug for DelayFr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayFr")
            .field("params", &self.params)
            .field("delay_time", &self.delay_time)
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: u64, params: &str) -> DelayFr {
        DelayFr::new(capacity, 0, DelayFrParams::parse(Some(params)).unwrap())
    }

    fn run(cache: &mut DelayFr, ids: &[u64]) {
        for &id in ids {
            cache.get(&Request::unit(id));
        }
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn hit_inside_delay_is_not_counted() {
            let mut c = cache(100, "delay-ratio=0.02");
            assert_eq!(c.delay_time(), 2);
            run(&mut c, &[1, 1, 2, 1]);
            assert_eq!(c.freq(1), Some(0));
            run(&mut c, &[3, 1]);
            // three ticks since 1 was inserted
            assert_eq!(c.freq(1), Some(1));
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn single_step_evict_requeues_and_returns() {
            let mut c = cache(3, "delay-ratio=0.0");
            run(&mut c, &[1, 2, 3, 1]);
            assert_eq!(c.freq(1), Some(1));
            c.evict(&Request::unit(9));
            assert_eq!(c.n_obj(), 3);
            assert_eq!(c.freq(1), Some(0));
            c.evict(&Request::unit(9));
            assert!(!c.contains(2));
        }

        #[test]
        fn get_loops_until_space_is_free() {
            let mut c = cache(3, "delay-ratio=0.0");
            run(&mut c, &[1, 2, 3, 1, 2, 3, 4]);
            assert_eq!(c.n_obj(), 3);
            assert!(c.contains(4));
            assert_eq!(c.state().n_promotion, 3);
            c.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        #[should_panic(expected = "to_evict")]
        fn to_evict_is_unsupported() {
            let mut c = cache(3, "");
            run(&mut c, &[1]);
            c.to_evict(&Request::unit(2));
        }
    }
}
