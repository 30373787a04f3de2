//! Builds policies from a name and a parameter string.
//!
//! Names are case-insensitive and accept the aliases traces and scripts
//! commonly use (`clock` = `fifo-reinsertion` = `second-chance`, `fh` =
//! `frozenhot`, ...). Parameters use the `key=value,key=value` grammar of
//! [`crate::params`]; `None` selects the policy defaults.
//!
//! ## Example
//!
//! ```rust
//! use cachesim::builder::CacheBuilder;
//! use cachesim::prelude::*;
//!
//! let mut cache = CacheBuilder::new(3).build("lru", None).unwrap();
//! for id in [1, 2, 3, 1, 4] {
//!     cache.get(&Request::unit(id));
//! }
//! assert!(cache.contains(1));
//! assert!(!cache.contains(2));
//!
//! // oracle policies need a trace annotated with next-access times
//! assert!(CacheBuilder::new(3).build("belady", None).is_err());
//! assert!(CacheBuilder::new(3).oracle_trace(true).build("belady", None).is_ok());
//! ```

use crate::error::ConfigError;
use crate::params::{PolicyParams, expect_no_params};
use crate::policy::age::{Age, AgeParams};
use crate::policy::bc::{BatchClock, BatchClockParams};
use crate::policy::belady::Belady;
use crate::policy::clock::{Clock, ClockParams};
use crate::policy::delay_clock::{DelayClock, DelayClockParams};
use crate::policy::delay_fr::{DelayFr, DelayFrParams};
use crate::policy::delay_predict::{DelayOffline, DelayOfflineParams, DelayOnline, DelayOnlineParams};
use crate::policy::fifo::Fifo;
use crate::policy::frozen_hot::{FrozenHot, FrozenHotParams};
use crate::policy::hot_cache::{HotCache, HotCacheParams};
use crate::policy::lru::Lru;
use crate::policy::lru_delay::{LruDelay, LruDelayParams};
use crate::policy::lru_prob::{LruProb, LruProbParams, PredProb, PredProbParams};
use crate::policy::offline_fr::{OfflineFr, OfflineFrParams};
use crate::policy::pred_clock::{PredClock, PredClockParams};
use crate::policy::pred_delay::{PredDelay, PredDelayParams};
use crate::policy::random::{Random, RandomBelady, RandomBeladyParams, RandomK, RandomKParams};
use crate::policy::sharded::{Sharded, ShardedParams};
use crate::policy::two_q::{TwoQ, TwoQParams};
use crate::traits::EvictionPolicy;

/// Bytes charged per counter-sized metadata field when metadata is counted.
const MD_FIELD_BYTES: u64 = 8;

/// Every registered policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Fifo,
    Lru,
    Clock,
    TwoQ,
    DelayClock,
    Age,
    PredClock,
    BatchClock,
    DelayFr,
    OfflineFr,
    LruDelay,
    LruProb,
    PredProb,
    PredDelay,
    DelayOffline,
    DelayOnline,
    FrozenHot,
    HotCache,
    Sharded,
    Belady,
    Random,
    RandomK,
    RandomBelady,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 23] = [
        Self::Fifo,
        Self::Lru,
        Self::Clock,
        Self::TwoQ,
        Self::DelayClock,
        Self::Age,
        Self::PredClock,
        Self::BatchClock,
        Self::DelayFr,
        Self::OfflineFr,
        Self::LruDelay,
        Self::LruProb,
        Self::PredProb,
        Self::PredDelay,
        Self::DelayOffline,
        Self::DelayOnline,
        Self::FrozenHot,
        Self::HotCache,
        Self::Sharded,
        Self::Belady,
        Self::Random,
        Self::RandomK,
        Self::RandomBelady,
    ];

    /// Resolves a case-insensitive policy name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "fifo" => Self::Fifo,
            "lru" => Self::Lru,
            "clock" | "fifo-reinsertion" | "second-chance" => Self::Clock,
            "2q" | "twoq" => Self::TwoQ,
            "delayclock" => Self::DelayClock,
            "age" => Self::Age,
            "predclock" => Self::PredClock,
            "bc" | "batch" => Self::BatchClock,
            "delayfr" => Self::DelayFr,
            "offlinefr" => Self::OfflineFr,
            "lru-delay" | "lrudelay" | "lru-delayv1" => Self::LruDelay,
            "lruprob" | "lru-prob" => Self::LruProb,
            "predprob" => Self::PredProb,
            "preddelay" => Self::PredDelay,
            "delay_offline" | "offlinedelay" => Self::DelayOffline,
            "delay_online" | "onlinedelay" => Self::DelayOnline,
            "frozenhot" | "fh" => Self::FrozenHot,
            "hotcache" => Self::HotCache,
            "sharding" | "sharded" => Self::Sharded,
            "belady" => Self::Belady,
            "random" => Self::Random,
            "randomk" => Self::RandomK,
            "randombelady" => Self::RandomBelady,
            _ => return None,
        };
        Some(kind)
    }

    /// Name the built policy reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fifo => Fifo::NAME,
            Self::Lru => Lru::NAME,
            Self::Clock => Clock::NAME,
            Self::TwoQ => TwoQ::NAME,
            Self::DelayClock => DelayClock::NAME,
            Self::Age => Age::NAME,
            Self::PredClock => PredClock::NAME,
            Self::BatchClock => BatchClock::NAME,
            Self::DelayFr => DelayFr::NAME,
            Self::OfflineFr => OfflineFr::NAME,
            Self::LruDelay => LruDelay::NAME,
            Self::LruProb => LruProb::NAME,
            Self::PredProb => PredProb::NAME,
            Self::PredDelay => PredDelay::NAME,
            Self::DelayOffline => DelayOffline::NAME,
            Self::DelayOnline => DelayOnline::NAME,
            Self::FrozenHot => FrozenHot::NAME,
            Self::HotCache => HotCache::NAME,
            Self::Sharded => Sharded::NAME,
            Self::Belady => Belady::NAME,
            Self::Random => Random::NAME,
            Self::RandomK => RandomK::NAME,
            Self::RandomBelady => RandomBelady::NAME,
        }
    }

    /// Whether requests must carry `next_access_vtime`.
    pub fn requires_oracle(self) -> bool {
        matches!(
            self,
            Self::OfflineFr
                | Self::PredDelay
                | Self::DelayOffline
                | Self::Belady
                | Self::RandomBelady
        )
    }

    /// Per-object metadata bytes charged when metadata is counted.
    pub fn obj_md_size(self) -> u64 {
        match self {
            Self::Clock
            | Self::DelayClock
            | Self::Age
            | Self::PredClock
            | Self::BatchClock
            | Self::DelayFr
            | Self::OfflineFr => MD_FIELD_BYTES,
            Self::LruDelay
            | Self::PredProb
            | Self::PredDelay
            | Self::DelayOffline
            | Self::DelayOnline
            | Self::Sharded => 2 * MD_FIELD_BYTES,
            Self::Fifo
            | Self::Lru
            | Self::TwoQ
            | Self::LruProb
            | Self::FrozenHot
            | Self::HotCache
            | Self::Belady
            | Self::Random
            | Self::RandomK
            | Self::RandomBelady => 0,
        }
    }
}

/// Builder for policy instances sharing one capacity and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBuilder {
    capacity: u64,
    consider_obj_metadata: bool,
    seed: u64,
    oracle_trace: bool,
}

impl CacheBuilder {
    /// Creates a builder for caches of `capacity` bytes (or objects, for
    /// unit-size traces).
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            consider_obj_metadata: false,
            seed: 0,
            oracle_trace: false,
        }
    }

    /// Charges per-object metadata overhead against the capacity.
    pub fn consider_obj_metadata(mut self, enabled: bool) -> Self {
        self.consider_obj_metadata = enabled;
        self
    }

    /// Seed for policies that draw random numbers.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Declares that the trace carries `next_access_vtime`; required by
    /// oracle policies.
    pub fn oracle_trace(mut self, annotated: bool) -> Self {
        self.oracle_trace = annotated;
        self
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Builds the policy registered as `name` with `params`.
    pub fn build(
        &self,
        name: &str,
        params: Option<&str>,
    ) -> Result<Box<dyn EvictionPolicy>, ConfigError> {
        let kind =
            PolicyKind::from_name(name).ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))?;
        let md = if self.consider_obj_metadata {
            kind.obj_md_size()
        } else {
            0
        };
        let cache = self.build_kind(kind, params, self.capacity, md, self.seed)?;
        tracing::debug!(
            policy = cache.name(),
            capacity = self.capacity,
            params = %cache.current_params(),
            "cache built"
        );
        Ok(cache)
    }

    fn build_kind(
        &self,
        kind: PolicyKind,
        params: Option<&str>,
        capacity: u64,
        md: u64,
        seed: u64,
    ) -> Result<Box<dyn EvictionPolicy>, ConfigError> {
        if kind.requires_oracle() && !self.oracle_trace {
            return Err(ConfigError::OracleRequired { policy: kind.name() });
        }

        let cache: Box<dyn EvictionPolicy> = match kind {
            PolicyKind::Fifo => {
                expect_no_params(Fifo::NAME, params)?;
                Box::new(Fifo::new(capacity, md))
            }
            PolicyKind::Lru => {
                expect_no_params(Lru::NAME, params)?;
                Box::new(Lru::new(capacity, md))
            }
            PolicyKind::Clock => Box::new(Clock::new(capacity, md, ClockParams::parse(params)?)),
            PolicyKind::TwoQ => Box::new(TwoQ::new(capacity, md, TwoQParams::parse(params)?)),
            PolicyKind::DelayClock => Box::new(DelayClock::new(
                capacity,
                md,
                DelayClockParams::parse(params)?,
            )),
            PolicyKind::Age => Box::new(Age::new(capacity, md, AgeParams::parse(params)?)),
            PolicyKind::PredClock => Box::new(PredClock::new(
                capacity,
                md,
                PredClockParams::parse(params)?,
            )),
            PolicyKind::BatchClock => Box::new(BatchClock::new(
                capacity,
                md,
                BatchClockParams::parse(params)?,
            )),
            PolicyKind::DelayFr => {
                Box::new(DelayFr::new(capacity, md, DelayFrParams::parse(params)?))
            }
            PolicyKind::OfflineFr => Box::new(OfflineFr::new(
                capacity,
                md,
                OfflineFrParams::parse(params)?,
            )),
            PolicyKind::LruDelay => {
                Box::new(LruDelay::new(capacity, md, LruDelayParams::parse(params)?))
            }
            PolicyKind::LruProb => Box::new(LruProb::new(
                capacity,
                md,
                LruProbParams::parse(params)?,
                seed,
            )),
            PolicyKind::PredProb => Box::new(PredProb::new(
                capacity,
                md,
                PredProbParams::parse(params)?,
                seed,
            )),
            PolicyKind::PredDelay => Box::new(PredDelay::new(
                capacity,
                md,
                PredDelayParams::parse(params)?,
            )),
            PolicyKind::DelayOffline => Box::new(DelayOffline::new(
                capacity,
                md,
                DelayOfflineParams::parse(params)?,
            )),
            PolicyKind::DelayOnline => Box::new(DelayOnline::new(
                capacity,
                md,
                DelayOnlineParams::parse(params)?,
            )),
            PolicyKind::FrozenHot => Box::new(FrozenHot::new(
                capacity,
                md,
                FrozenHotParams::parse(params)?,
            )),
            PolicyKind::HotCache => Box::new(HotCache::new(
                capacity,
                md,
                HotCacheParams::parse(params)?,
                seed,
            )),
            PolicyKind::Sharded => {
                let parsed = ShardedParams::parse(params)?;
                let base = PolicyKind::from_name(&parsed.base)
                    .ok_or_else(|| ConfigError::UnknownPolicy(parsed.base.clone()))?;
                if base == PolicyKind::Sharded {
                    return Err(ConfigError::invalid(
                        Sharded::NAME,
                        "base cannot itself be sharded",
                    ));
                }
                let mut shard_seed = seed;
                Box::new(Sharded::new(capacity, md, parsed, seed, |shard_capacity| {
                    shard_seed = shard_seed.wrapping_add(1);
                    self.build_kind(base, None, shard_capacity, md, shard_seed)
                })?)
            }
            PolicyKind::Belady => {
                expect_no_params(Belady::NAME, params)?;
                Box::new(Belady::new(capacity, md))
            }
            PolicyKind::Random => {
                expect_no_params(Random::NAME, params)?;
                Box::new(Random::new(capacity, md, seed))
            }
            PolicyKind::RandomK => Box::new(RandomK::new(
                capacity,
                md,
                RandomKParams::parse(params)?,
                seed,
            )),
            PolicyKind::RandomBelady => Box::new(RandomBelady::new(
                capacity,
                md,
                RandomBeladyParams::parse(params)?,
                seed,
            )),
        };
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn builder() -> CacheBuilder {
        CacheBuilder::new(10).oracle_trace(true)
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn every_kind_builds_with_defaults() {
            for kind in PolicyKind::ALL {
                let cache = builder().build(kind.name(), None).unwrap();
                assert_eq!(cache.name(), kind.name());
                assert_eq!(cache.requires_oracle(), kind.requires_oracle(), "{kind:?}");
                assert_eq!(cache.n_obj(), 0);
            }
        }

        #[test]
        fn aliases_resolve_case_insensitively() {
            for (alias, kind) in [
                ("Second-Chance", PolicyKind::Clock),
                ("FIFO-reinsertion", PolicyKind::Clock),
                ("2Q", PolicyKind::TwoQ),
                ("FH", PolicyKind::FrozenHot),
                ("lru-delayv1", PolicyKind::LruDelay),
                ("OfflineDelay", PolicyKind::DelayOffline),
                ("onlinedelay", PolicyKind::DelayOnline),
                ("sharding", PolicyKind::Sharded),
                ("RandomBelady", PolicyKind::RandomBelady),
            ] {
                assert_eq!(PolicyKind::from_name(alias), Some(kind), "{alias}");
            }
        }

        #[test]
        fn params_reach_the_policy() {
            let cache = builder().build("clock", Some("n-bit-counter=2")).unwrap();
            assert_eq!(cache.current_params(), "n-bit-counter=2");
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn unknown_policy_is_an_error() {
            let err = builder().build("lhd", None).unwrap_err();
            assert_eq!(err, ConfigError::UnknownPolicy("lhd".to_string()));
        }

        #[test]
        fn oracle_policy_without_annotated_trace_is_rejected() {
            let err = CacheBuilder::new(10).build("offlinefr", None).unwrap_err();
            assert!(matches!(err, ConfigError::OracleRequired { policy: "offlineFR" }));
        }

        #[test]
        fn parameterless_policy_rejects_parameters() {
            assert!(builder().build("fifo", Some("k=1")).is_err());
            assert!(builder().build("lru", Some("print")).unwrap_err().is_print_request());
        }

        #[test]
        fn metadata_overhead_is_charged() {
            let mut cache = CacheBuilder::new(100)
                .consider_obj_metadata(true)
                .build("lru-delay", None)
                .unwrap();
            cache.get(&Request::new(1, 10));
            assert_eq!(cache.occupied_bytes(), 26);
            assert_eq!(cache.state().obj_md_size, 16);
        }

        #[test]
        fn sharded_base_must_exist_and_not_recurse() {
            assert!(builder().build("sharding", Some("base=nope")).is_err());
            assert!(builder().build("sharding", Some("base=sharding")).is_err());
            let cache = builder().build("sharding", Some("n-shards=2,base=clock")).unwrap();
            assert_eq!(cache.current_params(), "n-shards=2,base=clock");
        }
    }
}
