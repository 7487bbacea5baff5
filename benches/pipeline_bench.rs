use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use regimerisk::copula::{CopulaEstimator, CopulaFamily};
use regimerisk::garch::{self, GarchFitOptions, Innovation};
use regimerisk::simulate::ScenarioSimulator;

// Estimation and simulation performance benchmarks
// Goals:
// - a single marginal fit stays comfortably sub-second on daily histories
// - simulation throughput scales with the scenario count

fn garch_returns(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (omega, alpha, beta) = (5.0e-6, 0.08, 0.90);
    let mut v: f64 = omega / (1.0 - alpha - beta);
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let z: f64 = StandardNormal.sample(&mut rng);
        let r = v.sqrt() * z;
        out.push(r);
        v = omega + alpha * r * r + beta * v;
    }
    out
}

fn bench_marginal_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("garch_fit");
    for n in [500usize, 2_000] {
        let returns = garch_returns(n, 42);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let model = garch::fit(
                    black_box(&returns),
                    Innovation::Gaussian,
                    &GarchFitOptions::default(),
                )
                .expect("benchmark series should fit");
                black_box(model.forecast_variance)
            })
        });
    }
    group.finish();
}

fn bench_scenario_simulation(c: &mut Criterion) {
    let returns_a = garch_returns(1_000, 1);
    let returns_b = garch_returns(1_000, 2);
    let options = GarchFitOptions::default();
    let marginals = vec![
        garch::fit(&returns_a, Innovation::Gaussian, &options).unwrap(),
        garch::fit(&returns_b, Innovation::Gaussian, &options).unwrap(),
    ];
    let copula = CopulaEstimator::new(CopulaFamily::Gaussian)
        .estimate(&marginals)
        .unwrap();

    let mut group = c.benchmark_group("scenario_simulation");
    for n_scenarios in [1_000usize, 5_000] {
        let simulator = ScenarioSimulator::new(n_scenarios, 10).with_seed(7);
        group.bench_with_input(
            BenchmarkId::from_parameter(n_scenarios),
            &n_scenarios,
            |b, _| {
                b.iter(|| {
                    let set = simulator
                        .simulate(black_box(&copula), black_box(&marginals))
                        .expect("simulation should succeed");
                    black_box(set.paths.len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_marginal_fit, bench_scenario_simulation);
criterion_main!(benches);
