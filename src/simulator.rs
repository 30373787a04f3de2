//! Trace replay.
//!
//! ```text
//!   annotate_next_access(&mut trace)      fills next_access_vtime (oracle)
//!   simulate(&mut cache, &trace)          one pass → CacheStats
//!   simulate_rounds(factory, &trace, n)   n fresh caches, version = 1..=n
//!   simulate_many(caches, &trace)         one thread per cache  [concurrency]
//! ```
//!
//! Caches share no state, so parallel replay needs no synchronization
//! beyond collecting the results.

use rustc_hash::FxHashMap;

use crate::error::ConfigError;
use crate::request::{NEVER, ObjId, Request};
use crate::stats::CacheStats;
use crate::traits::EvictionPolicy;

/// Sets every request's `next_access_vtime` to the index of the next request
/// for the same object, or [`NEVER`] for the last one.
pub fn annotate_next_access(trace: &mut [Request]) {
    let mut next_seen: FxHashMap<ObjId, i64> = FxHashMap::default();
    for (index, req) in trace.iter_mut().enumerate().rev() {
        let next = next_seen.insert(req.obj_id, index as i64).unwrap_or(NEVER);
        req.next_access_vtime = Some(next);
    }
}

/// Replays `trace` through `cache` and returns the resulting counters.
pub fn simulate<P: EvictionPolicy + ?Sized>(cache: &mut P, trace: &[Request]) -> CacheStats {
    let span = tracing::info_span!("simulate", cache = cache.name(), capacity = cache.state().capacity);
    let _guard = span.enter();

    for req in trace {
        cache.get(req);
    }

    let stats = cache.stats();
    tracing::info!(
        n_req = stats.n_req,
        n_miss = stats.n_miss,
        miss_ratio = stats.miss_ratio(),
        byte_miss_ratio = stats.byte_miss_ratio(),
        n_promotion = stats.n_promotion,
        "simulation finished"
    );
    stats
}

/// Replays `trace` `rounds` times, each round on a fresh cache from
/// `factory`. Round `r` (1-based) is tagged with `version = r`.
pub fn simulate_rounds<F>(
    mut factory: F,
    trace: &[Request],
    rounds: u32,
) -> Result<Vec<CacheStats>, ConfigError>
where
    F: FnMut() -> Result<Box<dyn EvictionPolicy>, ConfigError>,
{
    let mut results = Vec::with_capacity(rounds as usize);
    for version in 1..=rounds {
        let mut cache = factory()?;
        cache.state_mut().version = version;
        tracing::debug!(cache = cache.name(), version, "round started");
        results.push(simulate(cache.as_mut(), trace));
    }
    Ok(results)
}

/// Replays `trace` through every cache on its own scoped thread. Results
/// come back in the order of `caches`.
#[cfg(feature = "concurrency")]
pub fn simulate_many(caches: Vec<Box<dyn EvictionPolicy>>, trace: &[Request]) -> Vec<CacheStats> {
    use parking_lot::Mutex;

    let results: Mutex<Vec<Option<CacheStats>>> = Mutex::new(vec![None; caches.len()]);
    std::thread::scope(|scope| {
        for (index, mut cache) in caches.into_iter().enumerate() {
            let results = &results;
            scope.spawn(move || {
                let stats = simulate(cache.as_mut(), trace);
                results.lock()[index] = Some(stats);
            });
        }
    });
    results.into_inner().into_iter().flatten().collect()
}
