//! CLOCK (second-chance) eviction with an n-bit frequency counter.
//!
//! The classic ring with a hand is expressed as a queue: the tail is the
//! hand. A hit raises the object's counter up to `max_freq = 2^n − 1`; the
//! eviction sweep looks at the tail and, while its counter is non-zero,
//! decrements it and moves it to the head (its second chance). The first
//! object found with a zero counter is evicted.
//!
//! ## Architecture
//!
//! ```text
//!   head ─► [E:0] [D:1] [C:0] [B:2] [A:1] ◄── tail (hand)
//!
//!   evict():
//!     A:1 → A:0, requeue      head ─► [A:0] [E:0] [D:1] [C:0] [B:2]
//!     B:2 → B:1, requeue      head ─► [B:1] [A:0] [E:0] [D:1] [C:0]
//!     C:0 → evict C
//! ```
//!
//! ## Algorithm
//!
//! ```text
//! FIND(req):
//!   obj.freq = min(obj.freq + 1, max_freq)
//!   obj.last_access_vtime = n_req
//!
//! INSERT(req):
//!   prepend obj with freq = 0
//!
//! EVICT():
//!   obj = tail
//!   while obj.freq >= 1:
//!     obj.freq -= 1; move obj to head; n_promotion += 1
//!     obj = tail
//!   remove obj
//!
//! TO_EVICT():            (no mutation)
//!   obj = tail; round = 0
//!   while obj.freq - round >= 1:
//!     obj = obj.prev, wrapping to tail with round += 1
//!   return obj
//! ```
//!
//! Every requeue lowers the sum of all counters by one, so a single `evict`
//! requeues at most `n_obj × max_freq` objects before it finds a victim.
//!
//! ## Parameters
//!
//! | Key             | Default | Meaning                         |
//! |-----------------|---------|---------------------------------|
//! | `n-bit-counter` | 1       | counter width, `max_freq = 2^n − 1` |
//!
//! Registered as `clock`, `fifo-reinsertion` and `second-chance`.

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

/// Widest counter accepted; keeps `max_freq` well inside `u32`.
const MAX_COUNTER_BITS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockParams {
    pub n_bit_counter: u32,
}

impl ClockParams {
    #[inline]
    pub fn max_freq(&self) -> u32 {
        (1u32 << self.n_bit_counter) - 1
    }
}

impl Default for ClockParams {
    fn default() -> Self {
        Self { n_bit_counter: 1 }
    }
}

impl fmt::Display for ClockParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n-bit-counter={}", self.n_bit_counter)
    }
}

impl PolicyParams for ClockParams {
    const POLICY: &'static str = "Clock";
    const DEFAULTS: &'static str = "n-bit-counter=1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "n-bit-counter" => {
                let bits = param.uint(Self::POLICY)?;
                if bits > u64::from(MAX_COUNTER_BITS) {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        format!("n-bit-counter must be at most {MAX_COUNTER_BITS}"),
                    ));
                }
                self.n_bit_counter = bits as u32;
            }
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClockMeta {
    pub freq: u32,
    pub last_access_vtime: u64,
}

pub struct Clock {
    core: QueueCore<ClockMeta>,
    params: ClockParams,
    max_freq: u32,
}

impl Clock {
    pub const NAME: &'static str = "Clock";

    pub fn new(capacity: u64, obj_md_size: u64, params: ClockParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            max_freq: params.max_freq(),
            params,
        }
    }

    #[inline]
    pub fn max_freq(&self) -> u32 {
        self.max_freq
    }

    /// Counter value of a resident object.
    pub fn freq(&self, obj_id: ObjId) -> Option<u32> {
        self.core.lookup(obj_id).map(|id| self.core.meta(id).freq)
    }
}

impl EvictionPolicy for Clock {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            let n_req = self.core.state.n_req;
            let max_freq = self.max_freq;
            let meta = self.core.meta_mut(id);
            if meta.freq < max_freq {
                meta.freq += 1;
            }
            meta.last_access_vtime = n_req;
        }
        Some(self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let meta = ClockMeta {
            freq: 0,
            last_access_vtime: self.core.state.n_req,
        };
        let id = self.core.push_front(req, meta);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let tail = self.core.tail()?;
        let mut round = 0u32;
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
        while let Some(tail) = self.core.tail() {
            let meta = self.core.meta_mut(tail);
            if meta.freq == 0 {
                self.core.evict_slot(tail);
                return;
            }
            meta.freq -= 1;
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

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("capacity", &self.core.state.capacity)
            .field("max_freq", &self.max_freq)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}
