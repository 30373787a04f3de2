//! DHAT heap profiler for cachesim.
//!
//! Run with: cargo run --bin dhat_profile --release --features dhat-heap
//! View results: Open dhat-heap.json in <https://nnethercote.github.io/dh_view/dh_view.html>
//!
//! Set `RUST_LOG=cachesim=debug` to see structural events (FrozenHot
//! construction, HOTCache epochs) while profiling.

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use cachesim::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const CAPACITY: u64 = 4096;
const OPERATIONS: usize = 100_000;
const UNIVERSE: u64 = 16_384;

/// Hotset trace: 90% of accesses hit 10% of ids.
fn hotset_trace(operations: usize, universe: u64, seed: u64) -> Vec<Request> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let hot_size = universe / 10;
    (0..operations)
        .map(|_| {
            let id = if rng.r#gen::<f64>() < 0.9 {
                rng.gen_range(0..hot_size)
            } else {
                rng.gen_range(hot_size..universe)
            };
            Request::unit(id)
        })
        .collect()
}

/// Sequential scan over the whole universe.
fn scan_trace(operations: usize, universe: u64) -> Vec<Request> {
    (0..operations)
        .map(|i| Request::unit(i as u64 % universe))
        .collect()
}

fn profile(name: &str, params: Option<&str>, trace: &[Request]) {
    println!("=== Profiling {name} ===");
    let builder = CacheBuilder::new(CAPACITY).oracle_trace(true).seed(42);
    let mut cache = match builder.build(name, params) {
        Ok(cache) => cache,
        Err(err) => {
            eprintln!("  skipped: {err}");
            return;
        }
    };
    let stats = simulate(cache.as_mut(), trace);
    println!("  {stats}");
    println!("  Final size: {}", cache.n_obj());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let _profiler = dhat::Profiler::new_heap();

    println!("cachesim DHAT Heap Profiling");
    println!("============================\n");

    let mut trace = hotset_trace(OPERATIONS, UNIVERSE, 42);
    trace.extend(scan_trace(OPERATIONS / 2, UNIVERSE));
    annotate_next_access(&mut trace);

    profile("lru", None, &trace);
    profile("clock", Some("n-bit-counter=2"), &trace);
    profile("2q", None, &trace);
    profile("frozenhot", Some("split-point=0.5"), &trace);
    profile("hotcache", None, &trace);
    profile("sharding", Some("n-shards=8,base=lru"), &trace);
    profile("belady", None, &trace);

    println!("\n============================");
    println!("Profile written to dhat-heap.json");
}
