//! End-to-end reference scenario: a calm year whose volatility ramps from 8%
//! to 30% annualized over the last 20 trading days must move the detector
//! from the calm regime to the crisis regime and cut the recommended
//! aggregate exposure through the regime's risk scaling, all within one
//! evaluation cycle.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use regimerisk::config::{DetectionConfig, RegimeScheme, RiskLimits};
use regimerisk::copula::CopulaFamily;
use regimerisk::core::{Position, ReturnPanel};
use regimerisk::garch::Innovation;
use regimerisk::pipeline::{FailurePolicy, PipelineConfig, RiskPipeline};
use regimerisk::regime::RegimeDetector;

const N_ASSETS: usize = 25;
const CALM_PERIODS: usize = 252;
const RAMP_PERIODS: usize = 20;
const PERIODS_PER_YEAR: f64 = 252.0;

/// Annualized volatility profile: flat 8% for the calm phase, then a concave
/// ramp reaching 30% on the final day.
fn annualized_vol(period: usize) -> f64 {
    if period < CALM_PERIODS {
        0.08
    } else {
        let d = (period - CALM_PERIODS + 1) as f64 / RAMP_PERIODS as f64;
        0.08 + 0.22 * d.cbrt()
    }
}

/// Common-factor loading: diffuse in the calm phase, near-lockstep in the ramp.
fn factor_loading(period: usize) -> f64 {
    if period < CALM_PERIODS { 0.3 } else { 0.95 }
}

/// Generates the reference panel: one shared market factor plus
/// idiosyncratic noise, with the volatility and correlation shift above.
fn reference_panel(n_periods: usize, seed: u64) -> ReturnPanel {
    let mut rng = StdRng::seed_from_u64(seed);
    let factor: Vec<f64> = (0..n_periods)
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();

    let mut series = Vec::with_capacity(N_ASSETS);
    for _ in 0..N_ASSETS {
        let mut returns = Vec::with_capacity(n_periods);
        for (t, f) in factor.iter().enumerate() {
            let sigma = annualized_vol(t) / PERIODS_PER_YEAR.sqrt();
            let loading = factor_loading(t);
            let idio: f64 = StandardNormal.sample(&mut rng);
            let z = loading * f + (1.0 - loading * loading).sqrt() * idio;
            returns.push(sigma * z);
        }
        series.push(returns);
    }

    let assets = (0..N_ASSETS).map(|i| format!("A{i:02}")).collect();
    ReturnPanel::new(assets, series).unwrap()
}

fn book() -> Vec<Position> {
    let sectors = ["tech", "fin", "health", "energy", "industrials"];
    (0..N_ASSETS)
        .map(|i| Position {
            asset: format!("A{i:02}"),
            weight: 0.04,
            sector: sectors[i % sectors.len()].to_string(),
            adv_fraction: 0.05,
        })
        .collect()
}

fn build_pipeline() -> RiskPipeline {
    RiskPipeline::new(
        RegimeScheme::three_state(),
        DetectionConfig::default(),
        RiskLimits::default(),
        PipelineConfig {
            innovation: Innovation::Gaussian,
            copula_family: CopulaFamily::Gaussian,
            n_scenarios: 500,
            horizon: 10,
            seed: Some(20_240_817),
            failure_policy: FailurePolicy::ExcludeFailed,
            ..PipelineConfig::default()
        },
    )
    .unwrap()
}

#[test]
fn volatility_ramp_moves_the_detector_to_crisis_and_halves_exposure() {
    let full = reference_panel(CALM_PERIODS + RAMP_PERIODS, 2024);
    let calm_rows: Vec<Vec<f64>> = full
        .rows()
        .iter()
        .map(|s| s[..CALM_PERIODS].to_vec())
        .collect();
    let calm = ReturnPanel::new(full.assets().to_vec(), calm_rows).unwrap();

    let positions = book();
    let mut pipeline = build_pipeline();

    // A calm year first; the regime matures past the persistence floor.
    let mut last_calm_regime = String::new();
    for _ in 0..5 {
        let report = pipeline.run(&calm, None, &positions).unwrap();
        last_calm_regime = report.regime.regime.clone();
    }
    assert_eq!(last_calm_regime, "calm");
    assert!(pipeline.detector().last_state().unwrap().periods_in_regime >= 5);

    // Same evaluation cycle: detection, estimation, simulation, and the
    // de-risking decision all happen inside one run over the ramped panel.
    let report = pipeline.run(&full, None, &positions).unwrap();

    assert!(report.failures.is_empty(), "all marginal fits should converge");
    assert_eq!(report.regime.regime, "crisis");
    assert!(
        report.regime.observed_volatility > 0.20,
        "blended volatility should reflect the ramp, got {}",
        report.regime.observed_volatility
    );
    assert!(
        report.regime.observed_correlation > 0.6,
        "ramp-phase correlation should dominate, got {}",
        report.regime.observed_correlation
    );

    // Crisis scaling: target volatility shrinks by the 0.4 factor and the
    // uniform de-risking multiplier bottoms out at the scaling floor.
    assert!((report.assessment.risk_scaling - 0.4).abs() < 1.0e-12);
    assert!((report.assessment.scaled_target_volatility - 0.048).abs() < 1.0e-12);
    assert!(
        report.assessment.volatility_outside_band,
        "simulated volatility should breach the band, got {}",
        report.assessment.annualized_volatility
    );
    assert!((report.assessment.exposure_scale - 0.5).abs() < 1.0e-9);

    let before: f64 = positions.iter().map(|p| p.weight).sum();
    let after: f64 = positions
        .iter()
        .map(|p| p.weight + report.adjustments[&p.asset])
        .sum();
    assert!(
        (after / before - 0.5).abs() < 1.0e-9,
        "aggregate exposure should halve, got {}",
        after / before
    );

    assert!(report.report["exposure_scale"] < 0.51);
    assert!(report.report["var_utilization"] > 0.0);

    // The monitoring pass sees the same shift through the trailing history.
    let alerts = pipeline.monitor(&full, None);
    assert!(
        alerts.iter().any(|a| a.metric == "intraday_volatility_ratio"),
        "the ramp should trip the intraday volatility alert"
    );
    assert!(
        alerts.iter().any(|a| a.metric == "mean_correlation"),
        "lockstep returns should trip the correlation alert"
    );
}

#[test]
fn four_state_scheme_reads_the_ramp_as_high_volatility() {
    let full = reference_panel(CALM_PERIODS + RAMP_PERIODS, 2024);
    let mut detector =
        RegimeDetector::new(RegimeScheme::four_state(), DetectionConfig::default());

    let state = detector.detect(&full, None).unwrap();
    assert_eq!(state.regime, "high_volatility");
}

#[test]
fn ramp_reports_are_reproducible_under_the_same_seed() {
    let full = reference_panel(CALM_PERIODS + RAMP_PERIODS, 2024);
    let positions = book();

    let a = build_pipeline().run(&full, None, &positions).unwrap();
    let b = build_pipeline().run(&full, None, &positions).unwrap();
    assert_eq!(a, b, "identical seeds and inputs must reproduce the report");
}
