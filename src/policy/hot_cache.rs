//! HOTCache: a main cache fronted by a small buffer of hot copies.
//!
//! ```text
//!   get(x) ─► buffer index ──hit──► served, main cache untouched
//!                 │miss
//!                 ▼
//!             main cache (fifo / clock / lru / lruprob / lrudelay / lrubatch)
//!                 │hit, freq ≥ threshold, free slot
//!                 ▼
//!             copy x into buffer[slot]; the slot's previous occupant is
//!             handed back to the main cache
//! ```
//!
//! The main cache gets `capacity − size-buffer × capacity` units; buffer
//! slots hold copies of objects that are (or were) resident in it and do not
//! count towards occupancy.
//!
//! Frequencies are counted per epoch. An epoch ends when the buffer fills
//! with no refresh scheduled, or when the scheduled refresh time is reached.
//! A refresh restarts slot allocation from the first slot, raises the
//! admission threshold to `admission-divisor` and schedules the next refresh
//! one expected reuse distance (`capacity / miss_ratio`) ahead.
//!
//! `to_evict` and `remove` are unsupported.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{ConfigError, InvariantError};
use crate::params::{Amount, Float, Param, PolicyParams};
use crate::policy::bc::{BatchClock, BatchClockParams};
use crate::policy::clock::{Clock, ClockParams};
use crate::policy::expected_reuse_distance;
use crate::policy::fifo::Fifo;
use crate::policy::lru::Lru;
use crate::policy::lru_delay::{LruDelay, LruDelayParams};
use crate::policy::lru_prob::{LruProb, LruProbParams};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::{CacheState, EvictionPolicy};

/// Policy backing the main partition. The numbered variants carry the
/// tenths used as their parameter (`lruprob3` = `prob=0.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainCache {
    Fifo,
    Clock { n_bit_counter: u32 },
    Lru,
    LruProb(u8),
    LruDelay(u8),
    LruBatch(u8),
}

impl MainCache {
    fn parse(text: &str) -> Option<Self> {
        let numbered = |prefix: &str| -> Option<u8> {
            let digit = text.strip_prefix(prefix)?.parse::<u8>().ok()?;
            (1..=9).contains(&digit).then_some(digit)
        };
        match text {
            "fifo" => Some(Self::Fifo),
            "clock" => Some(Self::Clock { n_bit_counter: 1 }),
            "clock2" => Some(Self::Clock { n_bit_counter: 2 }),
            "clock3" => Some(Self::Clock { n_bit_counter: 3 }),
            "lru" => Some(Self::Lru),
            _ => numbered("lruprob")
                .map(Self::LruProb)
                .or_else(|| numbered("lrudelay").map(Self::LruDelay))
                .or_else(|| numbered("lrubatch").map(Self::LruBatch)),
        }
    }

    fn build(self, capacity: u64, obj_md_size: u64, seed: u64) -> Box<dyn EvictionPolicy> {
        let tenths = |d: u8| f64::from(d) / 10.0;
        match self {
            Self::Fifo => Box::new(Fifo::new(capacity, obj_md_size)),
            Self::Clock { n_bit_counter } => Box::new(Clock::new(
                capacity,
                obj_md_size,
                ClockParams { n_bit_counter },
            )),
            Self::Lru => Box::new(Lru::new(capacity, obj_md_size)),
            Self::LruProb(d) => Box::new(LruProb::new(
                capacity,
                obj_md_size,
                LruProbParams { prob: tenths(d) },
                seed,
            )),
            Self::LruDelay(d) => Box::new(LruDelay::new(
                capacity,
                obj_md_size,
                LruDelayParams {
                    delay_time: Amount::Ratio(tenths(d)),
                },
            )),
            Self::LruBatch(d) => Box::new(BatchClock::new(
                capacity,
                obj_md_size,
                BatchClockParams {
                    batch_size: Amount::Ratio(tenths(d)),
                },
            )),
        }
    }
}

impl fmt::Display for MainCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => f.write_str("fifo"),
            Self::Clock { n_bit_counter: 1 } => f.write_str("clock"),
            Self::Clock { n_bit_counter } => write!(f, "clock{n_bit_counter}"),
            Self::Lru => f.write_str("lru"),
            Self::LruProb(d) => write!(f, "lruprob{d}"),
            Self::LruDelay(d) => write!(f, "lrudelay{d}"),
            Self::LruBatch(d) => write!(f, "lrubatch{d}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotCacheParams {
    pub main_cache: MainCache,
    pub size_buffer: f64,
    pub admission_divisor: u64,
}

impl Default for HotCacheParams {
    fn default() -> Self {
        Self {
            main_cache: MainCache::Clock { n_bit_counter: 1 },
            size_buffer: 0.1,
            admission_divisor: 1,
        }
    }
}

impl fmt::Display for HotCacheParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "main-cache={},size-buffer={},admission-divisor={}",
            self.main_cache,
            Float(self.size_buffer),
            self.admission_divisor
        )
    }
}

impl PolicyParams for HotCacheParams {
    const POLICY: &'static str = "HOTCache";
    const DEFAULTS: &'static str = "main-cache=clock,size-buffer=0.1,admission-divisor=1";

    fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
        match param.key.as_str() {
            "main-cache" => {
                self.main_cache = MainCache::parse(&param.text()).ok_or_else(|| {
                    ConfigError::invalid(
                        Self::POLICY,
                        format!("main cache type {} is not supported", param.raw),
                    )
                })?;
            }
            "size-buffer" => {
                let ratio = param.float(Self::POLICY)?;
                if !(0.0..1.0).contains(&ratio) {
                    return Err(ConfigError::invalid(
                        Self::POLICY,
                        "size-buffer must be within [0, 1)",
                    ));
                }
                self.size_buffer = ratio;
            }
            "admission-divisor" => self.admission_divisor = param.uint(Self::POLICY)?,
            _ => return Err(self.unknown(param)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct EpochFreq {
    freq: u64,
    epoch: u64,
}

impl EpochFreq {
    fn bump(&mut self, epoch: u64) -> u64 {
        if self.epoch == epoch {
            self.freq += 1;
        } else {
            self.freq = 1;
            self.epoch = epoch;
        }
        self.freq
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferSlot {
    obj: ObjectRef,
    freq: EpochFreq,
}

pub struct HotCache {
    state: CacheState,
    params: HotCacheParams,
    main: Box<dyn EvictionPolicy>,
    main_capacity: u64,
    slots: Vec<Option<BufferSlot>>,
    buffer_index: FxHashMap<ObjId, usize>,
    freq: FxHashMap<ObjId, EpochFreq>,
    cursor: usize,
    next_refresh: Option<u64>,
    threshold: u64,
    highest_freq: u64,
    epoch: u64,
    miss: u64,
    found_in_buffer: u64,
}

impl HotCache {
    pub const NAME: &'static str = "HOTCache";

    pub fn new(capacity: u64, obj_md_size: u64, params: HotCacheParams, seed: u64) -> Self {
        let buffer_size = (params.size_buffer * capacity as f64) as usize;
        let main_capacity = capacity.saturating_sub(buffer_size as u64);
        Self {
            state: CacheState::new(capacity, obj_md_size),
            main: params.main_cache.build(main_capacity, obj_md_size, seed),
            main_capacity,
            params,
            slots: vec![None; buffer_size],
            buffer_index: FxHashMap::default(),
            freq: FxHashMap::default(),
            cursor: 0,
            next_refresh: None,
            threshold: 0,
            highest_freq: 0,
            epoch: 0,
            miss: 0,
            found_in_buffer: 0,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    pub fn main_capacity(&self) -> u64 {
        self.main_capacity
    }

    pub fn is_buffered(&self, obj_id: ObjId) -> bool {
        self.buffer_index.contains_key(&obj_id)
    }

    /// Completed epochs.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn found_in_buffer(&self) -> u64 {
        self.found_in_buffer
    }

    /// Highest per-epoch frequency seen in the current epoch.
    pub fn highest_freq(&self) -> u64 {
        self.highest_freq
    }

    /// Request count at which the next epoch starts; `None` while no miss
    /// has been observed at the last refresh.
    pub fn next_refresh(&self) -> Option<u64> {
        self.next_refresh
    }

    /// Per-epoch frequency a main-cache hit needs to enter the buffer.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    fn maybe_refresh(&mut self) {
        let n_req = self.state.n_req;
        let due = match self.next_refresh {
            Some(at) => at == n_req,
            None => !self.slots.is_empty() && self.cursor == self.slots.len(),
        };
        if !due {
            return;
        }

        let miss_ratio = if n_req == 0 {
            0.0
        } else {
            self.miss as f64 / n_req as f64
        };
        let erd = expected_reuse_distance(self.state.capacity, miss_ratio);
        self.next_refresh = erd.is_finite().then(|| n_req + erd as u64);
        self.threshold = self.params.admission_divisor;
        self.cursor = 0;
        self.highest_freq = 0;
        self.epoch += 1;
        tracing::debug!(
            epoch = self.epoch,
            miss_ratio,
            next_refresh = ?self.next_refresh,
            "hot buffer epoch refreshed"
        );
    }

    fn admit(&mut self, obj: ObjectRef, freq: EpochFreq) {
        let slot = self.cursor;
        if let Some(stale) = self.slots[slot].take()
            && self.buffer_index.remove(&stale.obj.obj_id).is_some()
        {
            // the copy goes back to the main cache, usually as a miss
            self.main.get(&Request::new(stale.obj.obj_id, stale.obj.obj_size));
        }
        self.buffer_index.insert(obj.obj_id, slot);
        self.slots[slot] = Some(BufferSlot { obj, freq });
        self.cursor += 1;
    }

    fn prune_freq(&mut self) {
        let bound = 2 * (self.main.n_obj() as usize + self.slots.len()) + 16;
        if self.freq.len() > bound {
            let main = &self.main;
            self.freq.retain(|&obj_id, _| main.contains(obj_id));
        }
    }

    fn sync_promotions(&mut self) {
        self.state.n_promotion = self.main.state().n_promotion;
    }
}

impl EvictionPolicy for HotCache {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &CacheState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut CacheState {
        &mut self.state
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        if !update {
            return match self.buffer_index.get(&req.obj_id) {
                Some(&slot) => self.slots[slot].map(|s| s.obj),
                None => self.main.find(req, false),
            };
        }

        self.maybe_refresh();

        if let Some(&slot) = self.buffer_index.get(&req.obj_id)
            && let Some(entry) = self.slots[slot].as_mut()
        {
            self.found_in_buffer += 1;
            let freq = entry.freq.bump(self.epoch);
            self.highest_freq = self.highest_freq.max(freq);
            return Some(entry.obj);
        }

        let obj = self.main.find(req, true)?;
        let epoch = self.epoch;
        let counter = self.freq.entry(req.obj_id).or_insert(EpochFreq { freq: 0, epoch });
        let freq = counter.bump(epoch);
        let snapshot = *counter;
        self.highest_freq = self.highest_freq.max(freq);

        if freq >= self.threshold && self.cursor < self.slots.len() {
            self.admit(obj, snapshot);
        }
        Some(obj)
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        self.miss += 1;
        let obj = self.main.insert(req)?;
        self.freq.insert(
            req.obj_id,
            EpochFreq {
                freq: 0,
                epoch: self.epoch,
            },
        );
        self.prune_freq();
        Some(obj)
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        panic!("HOTCache does not support to_evict");
    }

    fn evict(&mut self, req: &Request) {
        self.main.evict(req);
        self.sync_promotions();
    }

    fn remove(&mut self, _obj_id: ObjId) -> bool {
        panic!("HOTCache does not support remove");
    }

    fn contains(&self, obj_id: ObjId) -> bool {
        self.buffer_index.contains_key(&obj_id) || self.main.contains(obj_id)
    }

    fn occupied_bytes(&self) -> u64 {
        self.main.occupied_bytes()
    }

    fn n_obj(&self) -> u64 {
        self.main.n_obj()
    }

    fn current_params(&self) -> String {
        self.params.to_string()
    }

    fn can_insert(&self, req: &Request) -> bool {
        req.obj_size + self.state.obj_md_size <= self.main_capacity
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.main.check_invariants()?;
        for (&obj_id, &slot) in &self.buffer_index {
            match self.slots.get(slot).copied().flatten() {
                Some(entry) if entry.obj.obj_id == obj_id => {}
                _ => {
                    return Err(InvariantError::new(format!(
                        "buffer index maps {obj_id} to slot {slot} holding another object"
                    )));
                }
            }
        }
        if self.main.occupied_bytes() > self.main_capacity {
            return Err(InvariantError::new(format!(
                "main cache occupies {} of {} bytes",
                self.main.occupied_bytes(),
                self.main_capacity
            )));
        }
        Ok(())
    }

    fn get(&mut self, req: &Request) -> bool {
        self.state.n_req += 1;
        self.state.n_req_byte += req.obj_size;

        if self.find(req, true).is_some() {
            self.sync_promotions();
            return true;
        }

        self.state.n_miss += 1;
        self.state.n_miss_byte += req.obj_size;
        if !self.can_insert(req) {
            return false;
        }

        let needed = req.obj_size + self.state.obj_md_size;
        while self.main.occupied_bytes() + needed > self.main_capacity && self.main.n_obj() > 0 {
            self.evict(req);
        }
        if self.insert(req).is_some() {
            self.state.n_insert += 1;
        }
        self.sync_promotions();
        false
    }
}

impl fmt::Debug for HotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotCache")
            .field("params", &self.params)
            .field("main_capacity", &self.main_capacity)
            .field("buffered", &self.buffer_index.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: u64, params: &str) -> HotCache {
        HotCache::new(capacity, 0, HotCacheParams::parse(Some(params)).unwrap(), 0)
    }

    fn run(cache: &mut HotCache, ids: &[u64]) -> Vec<bool> {
        ids.iter().map(|&id| cache.get(&Request::unit(id))).collect()
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn buffer_takes_its_share_of_capacity() {
            let c = cache(10, "size-buffer=0.2");
            assert_eq!(c.buffer_size(), 2);
            assert_eq!(c.main_capacity(), 8);
        }

        #[test]
        fn main_cache_hits_fill_the_buffer() {
            let mut c = cache(10, "main-cache=lru,size-buffer=0.2");
            run(&mut c, &[1, 2, 3, 1, 2]);
            assert!(c.is_buffered(1));
            assert!(c.is_buffered(2));
            assert!(!c.is_buffered(3));
            assert_eq!(c.state().n_promotion, 2);
        }

        #[test]
        fn buffered_hit_bypasses_main_cache() {
            let mut c = cache(10, "main-cache=lru,size-buffer=0.2");
            let hits = run(&mut c, &[1, 2, 3, 1, 2, 1]);
            assert_eq!(hits, vec![false, false, false, true, true, true]);
            // the full buffer ended the first epoch before the last request
            assert_eq!(c.epoch(), 1);
            assert_eq!(c.found_in_buffer(), 1);
            assert_eq!(c.state().n_promotion, 2);
            c.check_invariants().unwrap();
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn new_epoch_reuses_slots_and_returns_stale_copies() {
            let mut c = cache(10, "main-cache=lru,size-buffer=0.2");
            run(&mut c, &[1, 2, 3, 1, 2, 1, 3]);
            assert!(c.is_buffered(3));
            assert!(!c.is_buffered(1));
            assert!(c.contains(1));
            c.check_invariants().unwrap();
        }

        #[test]
        fn buffered_copy_outlives_main_eviction() {
            let mut c = cache(10, "main-cache=fifo,size-buffer=0.2");
            run(&mut c, &[1, 1]);
            assert!(c.is_buffered(1));
            let scan: Vec<u64> = (100..120).collect();
            run(&mut c, &scan);
            assert!(c.n_obj() <= 8);
            assert!(c.get(&Request::unit(1)));
            c.check_invariants().unwrap();
        }

        #[test]
        fn every_main_cache_type_respects_capacity() {
            for main in ["fifo", "clock", "clock2", "clock3", "lru", "lruprob3", "lrudelay5", "lrubatch2"] {
                let mut c = cache(20, &format!("main-cache={main}"));
                let trace: Vec<u64> = (0..500).map(|i| (i * 31 + i / 7) % 37).collect();
                run(&mut c, &trace);
                assert!(c.occupied_bytes() <= c.main_capacity(), "{main}");
                c.check_invariants().unwrap();
            }
        }
    }

    mod refresh {
        use super::*;

        #[test]
        fn refresh_is_scheduled_one_reuse_distance_ahead() {
            let mut c = cache(10, "main-cache=lru,size-buffer=0.2,admission-divisor=3");
            // three misses, then two main hits fill both slots
            run(&mut c, &[1, 2, 3, 1, 2]);
            assert_eq!(c.epoch(), 0);
            assert_eq!(c.threshold(), 0);
            assert_eq!(c.next_refresh(), None);

            // full buffer: request 6 refreshes with miss ratio 3/6
            assert!(c.get(&Request::unit(1)));
            assert_eq!(c.epoch(), 1);
            assert_eq!(c.threshold(), 3);
            assert_eq!(c.next_refresh(), Some(6 + 20));

            // buffered hits leave the schedule alone until request 26
            run(&mut c, &[1; 19]);
            assert_eq!(c.state().n_req, 25);
            assert_eq!(c.epoch(), 1);
            c.get(&Request::unit(1));
            assert_eq!(c.epoch(), 2);
            // miss ratio 3/26 ⇒ erd 86.67
            assert_eq!(c.next_refresh(), Some(26 + 86));
            c.check_invariants().unwrap();
        }

        #[test]
        fn zero_miss_ratio_schedules_no_refresh() {
            let mut c = cache(10, "main-cache=lru,size-buffer=0.2");
            for id in 1..=4 {
                c.main.get(&Request::unit(id));
            }
            assert_eq!(run(&mut c, &[1, 2, 3]), vec![true; 3]);
            assert_eq!(c.state().n_miss, 0);
            assert_eq!(c.epoch(), 1);
            assert_eq!(c.next_refresh(), None);

            // with nothing scheduled, a full buffer ends the epoch again
            assert_eq!(run(&mut c, &[4, 1]), vec![true; 2]);
            assert_eq!(c.epoch(), 2);
            assert_eq!(c.next_refresh(), None);
            c.check_invariants().unwrap();
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn unknown_main_cache_is_rejected() {
            assert!(HotCacheParams::parse(Some("main-cache=arc")).is_err());
            assert!(HotCacheParams::parse(Some("main-cache=lruprob0")).is_err());
            assert!(HotCacheParams::parse(Some("size-buffer=1.0")).is_err());
        }

        #[test]
        fn params_round_trip() {
            let input = "main-cache=lrudelay3,size-buffer=0.05,admission-divisor=2";
            let p = HotCacheParams::parse(Some(input)).unwrap();
            assert_eq!(p.to_string(), input);
            assert_eq!(HotCacheParams::default().to_string(), HotCacheParams::DEFAULTS);
        }

        #[test]
        #[should_panic(expected = "does not support remove")]
        fn remove_is_unsupported() {
            let mut c = cache(10, "");
            c.remove(1);
        }
    }
}
