//! Replay throughput and miss ratio across every registered policy.
//!
//! Run with: `cargo bench --bench policies`
//!
//! Miss ratios are printed once per policy and workload before timing, so
//! one run doubles as a quick comparison table.

mod common;

use cachesim::builder::{CacheBuilder, PolicyKind};
use cachesim::simulator::{annotate_next_access, simulate};
use common::workload::{WorkloadSpec, standard_workloads};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

const CAPACITY: u64 = 4096;
const UNIVERSE: u64 = 16_384;
const OPERATIONS: usize = 100_000;

fn bench_policy_replay(c: &mut Criterion) {
    let builder = CacheBuilder::new(CAPACITY).oracle_trace(true).seed(42);

    for (workload_name, workload) in standard_workloads() {
        let mut trace = WorkloadSpec {
            universe: UNIVERSE,
            workload,
            seed: 42,
        }
        .trace(OPERATIONS);
        annotate_next_access(&mut trace);

        let mut group = c.benchmark_group(format!("replay_{workload_name}"));
        group.throughput(Throughput::Elements(OPERATIONS as u64));

        for kind in PolicyKind::ALL {
            let name = kind.name();
            let Ok(mut cache) = builder.build(name, None) else {
                continue;
            };
            let stats = simulate(cache.as_mut(), &trace);
            println!("{workload_name:>14} {name:>14}: miss ratio {:.4}", stats.miss_ratio());

            group.bench_function(BenchmarkId::from_parameter(name), |b| {
                b.iter_batched(
                    || builder.build(name, None).expect("default parameters are valid"),
                    |mut cache| std::hint::black_box(simulate(cache.as_mut(), &trace)),
                    BatchSize::LargeInput,
                )
            });
        }

        group.finish();
    }
}

criterion_group!(replay, bench_policy_replay);
criterion_main!(replay);
