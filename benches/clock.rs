//! Benchmarks for the CLOCK family.
//!
//! Run with: `cargo bench --bench clock`

mod common;

use std::time::Instant;

use cachesim::policy::clock::{Clock, ClockParams};
use cachesim::request::Request;
use cachesim::simulator::simulate;
use cachesim::traits::EvictionPolicy;
use common::workload::{WorkloadSpec, standard_workloads};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

const CAPACITY: u64 = 4096;

fn clock(n_bit_counter: u32) -> Clock {
    Clock::new(CAPACITY, 0, ClockParams { n_bit_counter })
}

// ============================================================================
// Get hit benchmarks (pure read performance)
// ============================================================================

fn bench_clock_get_hit_ns(c: &mut Criterion) {
    c.bench_function("clock_get_hit_ns", |b| {
        b.iter_custom(|iters| {
            let mut cache = clock(1);
            for i in 0..CAPACITY {
                cache.get(&Request::unit(i));
            }
            let start = Instant::now();
            for idx in 0..iters {
                let req = Request::unit(idx % CAPACITY);
                let _ = std::hint::black_box(cache.get(&req));
            }
            start.elapsed()
        })
    });
}

// ============================================================================
// Eviction churn: every object was referenced, so each miss sweeps
// ============================================================================

fn bench_clock_sweep_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock_sweep_churn");
    group.throughput(Throughput::Elements(CAPACITY));

    for n_bit_counter in [1u32, 2, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(n_bit_counter),
            &n_bit_counter,
            |b, &bits| {
                b.iter_batched(
                    || {
                        let mut cache = clock(bits);
                        for _ in 0..2 {
                            for i in 0..CAPACITY {
                                cache.get(&Request::unit(i));
                            }
                        }
                        cache
                    },
                    |mut cache| {
                        for i in 0..CAPACITY {
                            cache.get(&Request::unit(std::hint::black_box(CAPACITY + i)));
                        }
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

// ============================================================================
// Workload-based replay, CLOCK variants side by side
// ============================================================================

fn bench_clock_family_workloads(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock_family_workloads");
    let operations = 200_000usize;
    group.throughput(Throughput::Elements(operations as u64));

    let builder = cachesim::builder::CacheBuilder::new(CAPACITY);
    for (workload_name, workload) in standard_workloads() {
        let trace = WorkloadSpec {
            universe: 16_384,
            workload,
            seed: 42,
        }
        .trace(operations);
        for policy in ["clock", "delayclock", "age", "bc", "delayfr"] {
            group.bench_function(BenchmarkId::new(policy, workload_name), |b| {
                b.iter_batched(
                    || builder.build(policy, None).expect("default parameters are valid"),
                    |mut cache| std::hint::black_box(simulate(cache.as_mut(), &trace)),
                    BatchSize::LargeInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(micro_ops, bench_clock_get_hit_ns, bench_clock_sweep_churn);
criterion_group!(workloads, bench_clock_family_workloads);
criterion_main!(micro_ops, workloads);
