//! Batched CLOCK ("bc"): hits are recorded, not applied.
//!
//! A hit appends the object id to a bounded buffer instead of touching the
//! object. Once `batch-size` insertions have happened since the previous
//! flush, the next hit flushes the buffer: every buffered id that is still
//! resident gets its reference bit set, and the buffer is cleared. Eviction
//! is a plain 1-bit CLOCK sweep.
//!
//! ```text
//!   hit(x)  ──►  buffer [a, c, a, x]
//!                  │  insertions since flush ≥ batch-size
//!                  ▼
//!          a.freq = c.freq = x.freq = 1      buffer []
//! ```
//!
//! The buffer holds at most `100 × capacity` ids; past that the oldest
//! entries are overwritten.
//!
//! ## Parameters
//!
//! | Key          | Default | Meaning                                         |
//! |--------------|---------|-------------------------------------------------|
//! | `batch-size` | 0.2     | insertions between flushes (float × capacity); 0 means 1 |

use std::fmt;

use crate::error::ConfigError;
use crate::params::{Amount, Param, PolicyParams};
use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

const BUFFER_PER_CAPACITY: u64 = 100;
/// Ring length bound for very large capacities.
const MAX_BUFFER_LEN: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchClockParams {
    pub batch_size: Amount,
}

impl Default for BatchClockParams {
    fn default() -> Self {
        Self {
            batch_size: Amount::Ratio(0.2),
        }
    }
}

impl fmt::Display for BatchClockParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-size={}", self.batch_size)
    }
}

impl PolicyParams for BatchClockParams {
    const POLICY: &'static str = "bc";
    const DEFAULTS: &'static str = "batch-size=0.2";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "batch-size" => self.batch_size = Amount::from_param(param, Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

pub struct BatchClock {
    core: QueueCore<u8>,
    params: BatchClockParams,
    batch_size: u64,
    buffer: Vec<ObjId>,
    buffer_limit: usize,
    buffer_pos: usize,
    time_insert: u64,
    prev_promote_time: u64,
    n_flush: u64,
}

fn buffer_limit(capacity: u64) -> usize {
    let wanted = capacity.saturating_mul(BUFFER_PER_CAPACITY).max(1);
    usize::try_from(wanted).unwrap_or(usize::MAX).min(MAX_BUFFER_LEN)
}

impl BatchClock {
    pub const NAME: &'static str = "bc";

    pub fn new(capacity: u64, obj_md_size: u64, params: BatchClockParams) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
            batch_size: params.batch_size.resolve(capacity).max(1),
            params,
            buffer: Vec::new(),
            buffer_limit: buffer_limit(capacity),
            buffer_pos: 0,
            time_insert: 0,
            prev_promote_time: 0,
            n_flush: 0,
        }
    }

    /// Insertions between flushes after resolving against the capacity.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Hit-buffer slots before it wraps.
    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn n_flush(&self) -> u64 {
        self.n_flush
    }

    pub fn freq(&self, obj_id: ObjId) -> Option<u8> {
        self.core.lookup(obj_id).map(|id| *self.core.meta(id))
    }

    fn record(&mut self, obj_id: ObjId) {
        if self.buffer.len() < self.buffer_limit {
            self.buffer.push(obj_id);
        } else {
            self.buffer[self.buffer_pos % self.buffer_limit] = obj_id;
        }
        self.buffer_pos += 1;
    }

    fn flush(&mut self) {
        for obj_id in self.buffer.drain(..) {
            if let Some(id) = self.core.store.lookup(obj_id) {
                self.core.store[id].meta = 1;
            }
        }
        self.buffer_pos = 0;
        self.prev_promote_time = self.time_insert;
        self.n_flush += 1;
    }
}

impl EvictionPolicy for BatchClock {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        let obj = self.core.obj_ref(id);
        if update {
            self.record(obj.obj_id);
            if self.time_insert - self.prev_promote_time >= self.batch_size {
                self.flush();
            }
        }
        Some(obj)
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.time_insert += 1;
        let id = self.core.push_front(req, 0);
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let tail = self.core.tail()?;
        let mut candidate = tail;
        let mut round = 0u8;
        while self.core.meta(candidate).saturating_sub(round) >= 1 {
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
            let freq = self.core.meta_mut(tail);
            if *freq == 0 {
                self.core.evict_slot(tail);
                return;
            }
            *freq -= 1;
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

impl fmt::Debug for BatchClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchClock")
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .field("n_flush", &self.n_flush)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bc(capacity: u64, params: &str) -> BatchClock {
        BatchClock::new(capacity, 0, BatchClockParams::parse(Some(params)).unwrap())
    }

    fn run(cache: &mut BatchClock, ids: &[u64]) {
        for &id in ids {
            cache.get(&Request::unit(id));
        }
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn hits_are_buffered_until_batch() {
            let mut cache = bc(10, "batch-size=3");
            run(&mut cache, &[1, 2, 1]);
            assert_eq!(cache.freq(1), Some(0));
            assert_eq!(cache.buffered(), 1);
            run(&mut cache, &[3, 2]);
            // third insertion reached the batch size; the hit on 2 flushed
            assert_eq!(cache.freq(1), Some(1));
            assert_eq!(cache.freq(2), Some(1));
            assert_eq!(cache.buffered(), 0);
            assert_eq!(cache.n_flush(), 1);
        }

        #[test]
        fn ratio_resolves_against_capacity() {
            assert_eq!(bc(100, "batch-size=0.2").batch_size(), 20);
            assert_eq!(bc(100, "batch-size=0").batch_size(), 1);
            assert_eq!(bc(3, "batch-size=0.1").batch_size(), 1);
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn unflushed_hit_gives_no_second_chance() {
            let mut cache = bc(3, "batch-size=100");
            run(&mut cache, &[1, 2, 3, 1, 4]);
            assert!(!cache.contains(1));
            assert_eq!(cache.state().n_promotion, 0);
        }

        #[test]
        fn flushed_hit_gives_second_chance() {
            let mut cache = bc(3, "batch-size=1");
            run(&mut cache, &[1, 2, 3, 1, 4]);
            assert!(cache.contains(1));
            assert!(!cache.contains(2));
            cache.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn huge_capacity_bounds_the_hit_buffer() {
            let mut cache = BatchClock::new(u64::MAX, 0, BatchClockParams::default());
            assert_eq!(cache.buffer_limit(), MAX_BUFFER_LEN);
            run(&mut cache, &[1, 2, 1]);
            assert_eq!(cache.buffered(), 1);
            assert_eq!(bc(3, "").buffer_limit(), 300);
        }

        #[test]
        fn evicted_ids_in_buffer_are_ignored() {
            let mut cache = bc(2, "batch-size=5");
            run(&mut cache, &[1, 1, 2, 3, 4, 5, 4]);
            assert!(!cache.contains(1));
            assert_eq!(cache.buffered(), 0);
            assert_eq!(cache.freq(4), Some(1));
            cache.check_invariants().unwrap();
        }
    }
}
