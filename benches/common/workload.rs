//! Trace generators for policy benchmarks.

use cachesim::request::Request;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

#[derive(Debug, Clone, Copy)]
pub enum Workload {
    /// Uniform random ids in `[0, universe)`.
    Uniform,
    /// Hot/cold split with a configurable hot fraction and hot access probability.
    Hotset { hot_fraction: f64, hot_prob: f64 },
    /// Sequential scan in `[0, universe)`.
    Scan,
    /// Zipfian popularity; `theta` 0.99 is the YCSB default skew.
    Zipfian { theta: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct WorkloadSpec {
    pub universe: u64,
    pub workload: Workload,
    pub seed: u64,
}

impl WorkloadSpec {
    /// Generates `operations` unit-size requests.
    pub fn trace(self, operations: usize) -> Vec<Request> {
        let universe = self.universe.max(1);
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let zipf = match self.workload {
            Workload::Zipfian { theta } => Zipf::new(universe, theta).ok(),
            _ => None,
        };
        (0..operations)
            .map(|i| {
                let id = match self.workload {
                    Workload::Uniform => rng.gen_range(0..universe),
                    Workload::Hotset {
                        hot_fraction,
                        hot_prob,
                    } => {
                        let hot_size = ((universe as f64) * hot_fraction.clamp(0.0, 1.0)).round()
                            as u64;
                        let hot_size = hot_size.clamp(1, universe);
                        if rng.r#gen::<f64>() < hot_prob || hot_size == universe {
                            rng.gen_range(0..hot_size)
                        } else {
                            rng.gen_range(hot_size..universe)
                        }
                    },
                    Workload::Scan => i as u64 % universe,
                    Workload::Zipfian { .. } => match &zipf {
                        Some(zipf) => (zipf.sample(&mut rng) as u64).saturating_sub(1),
                        None => rng.gen_range(0..universe),
                    },
                };
                Request::unit(id)
            })
            .collect()
    }
}

/// The workload mix shared by hit-rate benchmarks.
pub fn standard_workloads() -> [(&'static str, Workload); 4] {
    [
        ("uniform", Workload::Uniform),
        (
            "hotset_90_10",
            Workload::Hotset {
                hot_fraction: 0.1,
                hot_prob: 0.9,
            },
        ),
        ("scan", Workload::Scan),
        ("zipfian_0.99", Workload::Zipfian { theta: 0.99 }),
    ]
}
