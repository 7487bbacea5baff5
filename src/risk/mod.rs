//! Regime-conditional portfolio risk engine.
//!
//! Consumes the current regime state, a simulated scenario set, and the
//! position book to compute tail-risk metrics, enforce limits, and propose
//! position adjustments. Limit breaches are data (alerts and adjustments),
//! never errors; the engine does not throw on a breached limit.
//!
//! Conventions follow loss-positive tail metrics (`loss = -return`): VaR and
//! Expected Shortfall are reported as non-negative loss numbers.
//!
//! References:
//! - McNeil, Frey, Embrechts, *Quantitative Risk Management* (2015), VaR/ES.
//! - J.P. Morgan/Reuters, *RiskMetrics Technical Document* (1996).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RiskLimits};
use crate::core::{Alert, AlertCategory, AlertSeverity, Position, ReturnPanel, RiskReport};
use crate::math::{
    PERIODS_PER_YEAR, empirical_quantile, max_drawdown, momentum_zscore, sample_mean,
    sample_std_dev,
};
use crate::regime::RegimeState;
use crate::simulate::ScenarioSet;

/// Value-at-Risk of a scenario return sample, as a positive loss.
///
/// # Panics
/// Panics on an empty sample or confidence outside (0, 1).
pub fn scenario_var(returns: &[f64], confidence: f64) -> f64 {
    assert!(!returns.is_empty(), "returns must not be empty");
    assert!(
        confidence > 0.0 && confidence < 1.0,
        "confidence must be in (0,1)"
    );
    let mut losses: Vec<f64> = returns.iter().map(|r| -r).collect();
    empirical_quantile(&mut losses, confidence).max(0.0)
}

/// Expected Shortfall (average loss beyond VaR) of a scenario return sample.
///
/// # Panics
/// Panics on an empty sample or confidence outside (0, 1).
pub fn scenario_expected_shortfall(returns: &[f64], confidence: f64) -> f64 {
    let var = scenario_var(returns, confidence);

    let mut tail_sum = 0.0;
    let mut tail_count = 0usize;
    for &r in returns {
        let loss = -r;
        if loss >= var - 1.0e-12 {
            tail_sum += loss;
            tail_count += 1;
        }
    }

    if tail_count == 0 {
        var
    } else {
        (tail_sum / tail_count as f64).max(0.0)
    }
}

/// Portfolio-level metrics from one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Horizon VaR at the configured confidence (positive loss).
    pub var: f64,
    /// Horizon Expected Shortfall at the configured confidence.
    pub expected_shortfall: f64,
    /// Annualized volatility of simulated per-period portfolio returns.
    pub annualized_volatility: f64,
    /// Mean over scenarios of the maximum peak-to-trough drawdown.
    pub expected_max_drawdown: f64,
    /// Regime-scaled volatility target.
    pub scaled_target_volatility: f64,
    /// Sum of position weights.
    pub gross_exposure: f64,
    /// Largest aggregate sector weight.
    pub max_sector_weight: f64,
    pub var_breach: bool,
    pub expected_shortfall_breach: bool,
    pub drawdown_breach: bool,
    /// Realized volatility outside the acceptable band.
    pub volatility_outside_band: bool,
    /// Uniform multiplier applied to all weights for portfolio-level
    /// breaches; 1 when no portfolio-level action is required.
    pub exposure_scale: f64,
    /// Regime label the assessment was made under.
    pub regime: String,
    /// Regime risk-scaling factor in effect.
    pub risk_scaling: f64,
}

/// Intraday market observables consumed by the monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Current intraday peak-to-trough drawdown.
    pub intraday_drawdown: f64,
    /// Intraday-to-baseline realized volatility ratio.
    pub volatility_ratio: f64,
    /// Intraday-to-baseline volume ratio.
    pub volume_ratio: f64,
    /// Observed-to-baseline bid/ask spread ratio.
    pub spread_ratio: f64,
    /// Observed-to-baseline market depth ratio (below 1 = thinner).
    pub liquidity_ratio: f64,
    /// Momentum z-score over the configured windows.
    pub momentum_zscore: f64,
    /// Mean pairwise correlation across the book.
    pub mean_correlation: f64,
}

/// Regime-conditional risk engine over static, validated limits.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    limits: RiskLimits,
    last_assessment: Option<RiskAssessment>,
}

impl RiskEngine {
    /// Builds an engine, validating the limit configuration first.
    ///
    /// # Errors
    /// Returns the underlying [`ConfigError`] for invalid limits.
    pub fn new(limits: RiskLimits) -> Result<Self, ConfigError> {
        Ok(Self {
            limits: limits.validated()?,
            last_assessment: None,
        })
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// The most recent assessment, if an evaluation has run.
    pub fn last_assessment(&self) -> Option<&RiskAssessment> {
        self.last_assessment.as_ref()
    }

    /// Evaluates portfolio risk for the current book under the simulated
    /// scenario distribution and the prevailing regime.
    ///
    /// Position order must align with the scenario set's asset columns.
    ///
    /// # Panics
    /// Panics when positions and scenario assets disagree in count or any
    /// weight is negative (the engine models a long-only book).
    pub fn assess(
        &mut self,
        positions: &[Position],
        scenarios: &ScenarioSet,
        regime: &RegimeState,
    ) -> RiskAssessment {
        assert_eq!(
            positions.len(),
            scenarios.n_assets,
            "positions must align with scenario asset columns"
        );
        assert!(
            positions.iter().all(|p| p.weight >= 0.0),
            "weights must be non-negative"
        );

        let weights: Vec<f64> = positions.iter().map(|p| p.weight).collect();
        let horizon_returns = scenarios.portfolio_returns(&weights);
        let paths = scenarios.portfolio_paths(&weights);

        let confidence = self.limits.portfolio.var_confidence;
        let var = scenario_var(&horizon_returns, confidence);
        let expected_shortfall = scenario_expected_shortfall(&horizon_returns, confidence);

        let per_period: Vec<f64> = paths.iter().flatten().copied().collect();
        let annualized_volatility = if per_period.len() >= 2 {
            sample_std_dev(&per_period) * PERIODS_PER_YEAR.sqrt()
        } else {
            0.0
        };

        let expected_max_drawdown =
            paths.iter().map(|p| max_drawdown(p)).sum::<f64>() / paths.len().max(1) as f64;

        let gross_exposure: f64 = weights.iter().sum();
        let max_sector_weight = sector_weights(positions)
            .values()
            .fold(0.0_f64, |acc, w| acc.max(*w));

        let p = &self.limits.portfolio;
        let v = &self.limits.volatility;
        let var_breach = var > p.var_limit;
        let expected_shortfall_breach = expected_shortfall > p.expected_shortfall;
        let drawdown_breach = expected_max_drawdown > p.max_drawdown;
        let volatility_outside_band =
            annualized_volatility < v.band.0 || annualized_volatility > v.band.1;

        let scaled_target_volatility = v.target * regime.risk_scaling;

        // Net de-risking factor for portfolio-level breaches; the volatility
        // band contributes in both directions, loss limits only downward.
        let mut exposure_scale = 1.0_f64;
        if var_breach {
            exposure_scale = exposure_scale.min(p.var_limit / var);
        }
        if expected_shortfall_breach {
            exposure_scale = exposure_scale.min(p.expected_shortfall / expected_shortfall);
        }
        if drawdown_breach {
            exposure_scale = exposure_scale.min(p.max_drawdown / expected_max_drawdown);
        }
        if volatility_outside_band && annualized_volatility > 0.0 {
            exposure_scale = exposure_scale.min(scaled_target_volatility / annualized_volatility);
        }
        exposure_scale = exposure_scale.clamp(v.scaling_limits.0, v.scaling_limits.1);
        if !var_breach && !expected_shortfall_breach && !drawdown_breach && !volatility_outside_band
        {
            exposure_scale = 1.0;
        }

        let assessment = RiskAssessment {
            var,
            expected_shortfall,
            annualized_volatility,
            expected_max_drawdown,
            scaled_target_volatility,
            gross_exposure,
            max_sector_weight,
            var_breach,
            expected_shortfall_breach,
            drawdown_breach,
            volatility_outside_band,
            exposure_scale,
            regime: regime.regime.clone(),
            risk_scaling: regime.risk_scaling,
        };
        self.last_assessment = Some(assessment.clone());
        assessment
    }

    /// Proposes per-asset weight adjustments for the current book.
    ///
    /// Position-level policy: weights are clamped into the single-name band,
    /// liquidity-capped against ADV consumption, and sector-scaled; weight
    /// freed by shrinking breaching names is redistributed proportionally to
    /// unconstrained names (single pass, capped at the single-name limit) so
    /// gross exposure is preserved. Portfolio-level breaches then scale every
    /// weight uniformly by the assessment's exposure factor.
    ///
    /// Returns the complete asset-to-delta mapping (zero deltas included).
    pub fn calculate_position_adjustments(
        &mut self,
        positions: &[Position],
        scenarios: &ScenarioSet,
        regime: &RegimeState,
    ) -> BTreeMap<String, f64> {
        let assessment = self.assess(positions, scenarios, regime);
        let limits = self.limits.position;

        let mut targets: Vec<f64> = positions.iter().map(|p| p.weight).collect();
        let mut constrained = vec![false; positions.len()];

        // Single-name band.
        for (i, pos) in positions.iter().enumerate() {
            let clamped = pos
                .weight
                .clamp(limits.min_single_name, limits.max_single_name);
            if (clamped - pos.weight).abs() > f64::EPSILON {
                targets[i] = clamped;
                constrained[i] = true;
            }
        }

        // Liquidity: shrink so ADV consumption lands exactly on the threshold.
        for (i, pos) in positions.iter().enumerate() {
            if pos.adv_fraction > limits.liquidity_threshold {
                let scale = limits.liquidity_threshold / pos.adv_fraction;
                targets[i] = targets[i].min(pos.weight * scale);
                constrained[i] = true;
            }
        }

        // Sector caps: proportional shrink of every member of a breaching sector.
        let mut sector_totals: BTreeMap<&str, f64> = BTreeMap::new();
        for (i, pos) in positions.iter().enumerate() {
            *sector_totals.entry(pos.sector.as_str()).or_insert(0.0) += targets[i];
        }
        for (sector, total) in &sector_totals {
            if *total > limits.max_sector {
                let scale = limits.max_sector / total;
                for (i, pos) in positions.iter().enumerate() {
                    if pos.sector == *sector {
                        targets[i] *= scale;
                        constrained[i] = true;
                    }
                }
            }
        }

        // Redistribute freed weight to unconstrained names, preserving gross
        // exposure. Single pass: receivers are capped at the single-name
        // limit and any residual stays unallocated.
        let original: f64 = positions.iter().map(|p| p.weight).sum();
        let freed = original - targets.iter().sum::<f64>();
        if freed.abs() > 1.0e-12 {
            let receiver_mass: f64 = targets
                .iter()
                .zip(constrained.iter())
                .filter(|(_, c)| !**c)
                .map(|(t, _)| *t)
                .sum();
            if receiver_mass > 0.0 {
                for i in 0..targets.len() {
                    if !constrained[i] {
                        let share = targets[i] / receiver_mass;
                        targets[i] = (targets[i] + freed * share)
                            .clamp(limits.min_single_name, limits.max_single_name);
                    }
                }
            }
        }

        // Portfolio-level de-risking or band scaling, uniform across names.
        if (assessment.exposure_scale - 1.0).abs() > f64::EPSILON {
            for t in targets.iter_mut() {
                *t = (*t * assessment.exposure_scale).min(limits.max_single_name);
            }
        }

        positions
            .iter()
            .zip(targets.iter())
            .map(|(pos, target)| (pos.asset.clone(), target - pos.weight))
            .collect()
    }

    /// Applies an adjustment mapping as one set-wise update.
    ///
    /// The whole book is updated under one exclusive borrow, so no reader can
    /// observe a partially-adjusted portfolio.
    pub fn apply_adjustments(positions: &mut [Position], adjustments: &BTreeMap<String, f64>) {
        for pos in positions.iter_mut() {
            if let Some(delta) = adjustments.get(&pos.asset) {
                pos.weight += delta;
            }
        }
    }

    /// Named metrics and per-limit utilization ratios from the last
    /// evaluation cycle, or `None` before the first one.
    pub fn risk_report(&self) -> Option<RiskReport> {
        let a = self.last_assessment.as_ref()?;
        let p = &self.limits.portfolio;

        let mut report = RiskReport::new();
        report.insert("var".to_string(), a.var);
        report.insert("var_limit".to_string(), p.var_limit);
        report.insert("var_utilization".to_string(), a.var / p.var_limit);
        report.insert("expected_shortfall".to_string(), a.expected_shortfall);
        report.insert("expected_shortfall_limit".to_string(), p.expected_shortfall);
        report.insert(
            "expected_shortfall_utilization".to_string(),
            a.expected_shortfall / p.expected_shortfall,
        );
        report.insert("annualized_volatility".to_string(), a.annualized_volatility);
        report.insert("target_volatility".to_string(), a.scaled_target_volatility);
        report.insert(
            "volatility_utilization".to_string(),
            a.annualized_volatility / a.scaled_target_volatility.max(1.0e-12),
        );
        report.insert("expected_max_drawdown".to_string(), a.expected_max_drawdown);
        report.insert(
            "drawdown_utilization".to_string(),
            a.expected_max_drawdown / p.max_drawdown,
        );
        report.insert("gross_exposure".to_string(), a.gross_exposure);
        report.insert("max_sector_weight".to_string(), a.max_sector_weight);
        report.insert(
            "concentration_utilization".to_string(),
            a.max_sector_weight / p.concentration_limit,
        );
        report.insert("exposure_scale".to_string(), a.exposure_scale);
        report.insert("regime_risk_scaling".to_string(), a.risk_scaling);
        Some(report)
    }

    /// Derives a monitoring snapshot from trailing return (and optional
    /// volume) history.
    ///
    /// The momentum signal uses the configured momentum windows; volatility
    /// and drawdown observables come from the short window against the full
    /// sample. Observables the history cannot supply (spreads, depth) default
    /// to the neutral ratio 1; callers with live market data overwrite them.
    ///
    /// # Panics
    /// Panics on a panel with fewer than two periods.
    pub fn snapshot_from_history(
        &self,
        panel: &ReturnPanel,
        volumes: Option<&[Vec<f64>]>,
    ) -> MarketSnapshot {
        let momentum = &self.limits.momentum;
        let n_periods = panel.n_periods();
        assert!(n_periods >= 2, "snapshot requires at least two periods");
        let short = momentum.short_window.min(n_periods).max(2);

        let momentum_signal = if n_periods >= momentum.long_window {
            let total: f64 = (0..panel.n_assets())
                .map(|a| {
                    momentum_zscore(
                        panel.series(a),
                        momentum.short_window,
                        momentum.long_window,
                    )
                })
                .sum();
            total / panel.n_assets() as f64
        } else {
            0.0
        };

        let mut volatility_ratio = 0.0;
        for a in 0..panel.n_assets() {
            let series = panel.series(a);
            let recent = sample_std_dev(&series[n_periods - short..]);
            let baseline = sample_std_dev(series).max(1.0e-12);
            volatility_ratio += recent / baseline;
        }
        volatility_ratio /= panel.n_assets() as f64;

        // Equal-weighted book drawdown over the short window.
        let mean_path: Vec<f64> = (n_periods - short..n_periods)
            .map(|t| {
                let total: f64 = (0..panel.n_assets()).map(|a| panel.series(a)[t]).sum();
                total / panel.n_assets() as f64
            })
            .collect();
        let intraday_drawdown = max_drawdown(&mean_path);

        let mean_correlation = recent_mean_correlation(panel, short);

        let volume_ratio = volumes
            .map(|series| {
                let mut ratio = 0.0;
                let mut counted = 0usize;
                for v in series {
                    if v.len() >= short {
                        let recent = sample_mean(&v[v.len() - short..]);
                        let baseline = sample_mean(v);
                        if baseline > 0.0 {
                            ratio += recent / baseline;
                            counted += 1;
                        }
                    }
                }
                if counted == 0 { 1.0 } else { ratio / counted as f64 }
            })
            .unwrap_or(1.0);

        MarketSnapshot {
            intraday_drawdown,
            volatility_ratio,
            volume_ratio,
            spread_ratio: 1.0,
            liquidity_ratio: 1.0,
            momentum_zscore: momentum_signal,
            mean_correlation,
        }
    }

    /// Evaluates monitoring thresholds against an intraday snapshot.
    ///
    /// Independent of the adjustment step; produces alerts, mutates nothing.
    pub fn monitor(&self, snapshot: &MarketSnapshot) -> Vec<Alert> {
        let thresholds = &self.limits.monitoring;
        let mut alerts = Vec::new();

        let mut upper = |category, metric: &str, value: f64, threshold: f64| {
            if value >= threshold {
                alerts.push(Alert {
                    category,
                    metric: metric.to_string(),
                    value,
                    threshold,
                    severity: upper_breach_severity(value, threshold),
                });
            }
        };

        upper(
            AlertCategory::Intraday,
            "intraday_drawdown",
            snapshot.intraday_drawdown,
            thresholds.intraday_drawdown,
        );
        upper(
            AlertCategory::Intraday,
            "intraday_volatility_ratio",
            snapshot.volatility_ratio,
            thresholds.intraday_volatility_ratio,
        );
        upper(
            AlertCategory::Intraday,
            "intraday_volume_ratio",
            snapshot.volume_ratio,
            thresholds.intraday_volume_ratio,
        );

        if let Some(a) = &self.last_assessment {
            let concentration = a.max_sector_weight / self.limits.portfolio.concentration_limit;
            upper(
                AlertCategory::Utilization,
                "concentration_utilization",
                concentration,
                thresholds.concentration_utilization,
            );
            let var_utilization = a.var / self.limits.portfolio.var_limit;
            upper(
                AlertCategory::Utilization,
                "var_utilization",
                var_utilization,
                thresholds.var_utilization,
            );
        }
        upper(
            AlertCategory::Utilization,
            "mean_correlation",
            snapshot.mean_correlation,
            thresholds.correlation_level,
        );

        upper(
            AlertCategory::MarketCondition,
            "spread_widening",
            snapshot.spread_ratio,
            thresholds.spread_widening_ratio,
        );
        upper(
            AlertCategory::MarketCondition,
            "momentum_reversal",
            snapshot.momentum_zscore.abs(),
            thresholds.momentum_zscore,
        );

        if snapshot.liquidity_ratio <= thresholds.liquidity_reduction_ratio {
            alerts.push(Alert {
                category: AlertCategory::MarketCondition,
                metric: "liquidity_reduction".to_string(),
                value: snapshot.liquidity_ratio,
                threshold: thresholds.liquidity_reduction_ratio,
                severity: if snapshot.liquidity_ratio <= thresholds.liquidity_reduction_ratio / 1.5
                {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
            });
        }

        alerts
    }
}

fn upper_breach_severity(value: f64, threshold: f64) -> AlertSeverity {
    if value >= threshold * 1.5 {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}

fn sector_weights(positions: &[Position]) -> BTreeMap<&str, f64> {
    let mut totals = BTreeMap::new();
    for pos in positions {
        *totals.entry(pos.sector.as_str()).or_insert(0.0) += pos.weight;
    }
    totals
}

/// Mean pairwise sample correlation over the trailing `window` periods.
fn recent_mean_correlation(panel: &ReturnPanel, window: usize) -> f64 {
    let d = panel.n_assets();
    if d < 2 {
        return 0.0;
    }

    let start = panel.n_periods() - window;
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..d {
        for j in (i + 1)..d {
            let x = &panel.series(i)[start..];
            let y = &panel.series(j)[start..];
            let mx = sample_mean(x);
            let my = sample_mean(y);
            let mut cov = 0.0;
            let mut vx = 0.0;
            let mut vy = 0.0;
            for (a, b) in x.iter().zip(y.iter()) {
                cov += (a - mx) * (b - my);
                vx += (a - mx) * (a - mx);
                vy += (b - my) * (b - my);
            }
            if vx > 1.0e-24 && vy > 1.0e-24 {
                total += cov / (vx.sqrt() * vy.sqrt());
            }
            pairs += 1;
        }
    }
    total / pairs as f64
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn position(asset: &str, weight: f64, sector: &str, adv_fraction: f64) -> Position {
        Position {
            asset: asset.to_string(),
            weight,
            sector: sector.to_string(),
            adv_fraction,
        }
    }

    fn calm_state(risk_scaling: f64) -> RegimeState {
        RegimeState {
            regime: "calm".to_string(),
            regime_index: 0,
            confidence: 0.9,
            probabilities: vec![0.9, 0.08, 0.02],
            risk_scaling,
            periods_in_regime: 10,
            transition_matrix: vec![vec![1.0]],
            observed_volatility: 0.10,
            observed_correlation: 0.3,
            volume_surge: None,
        }
    }

    /// Scenario set where every asset moves together by +/- `step` each period.
    fn alternating_scenarios(n_assets: usize, n_scenarios: usize, step: f64) -> ScenarioSet {
        let paths: Vec<Vec<Vec<f64>>> = (0..n_scenarios)
            .map(|s| {
                let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
                vec![vec![sign * step; n_assets]]
            })
            .collect();
        ScenarioSet {
            horizon: 1,
            n_scenarios,
            n_assets,
            paths,
        }
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskLimits::default()).unwrap()
    }

    #[test]
    fn var_and_es_match_reference_values() {
        let returns = [-0.05, -0.03, -0.01, 0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06];
        let var_90 = scenario_var(&returns, 0.90);
        let es_90 = scenario_expected_shortfall(&returns, 0.90);
        assert!(var_90 > 0.0 && es_90 >= var_90);
        assert_relative_eq!(var_90, 0.032, epsilon = 1.0e-12);
    }

    #[test]
    fn oversized_position_is_clamped_to_the_limit_and_exposure_preserved() {
        let positions = vec![
            position("A", 0.08, "tech", 0.05),
            position("B", 0.02, "fin", 0.05),
            position("C", 0.02, "health", 0.05),
        ];
        // Joint +/-7% asset moves put portfolio vol inside the band and the
        // tail metrics inside their limits: no portfolio-level action.
        let scenarios = alternating_scenarios(3, 200, 0.07);

        let mut eng = engine();
        let adjustments =
            eng.calculate_position_adjustments(&positions, &scenarios, &calm_state(1.0));

        let assessment = eng.last_assessment().unwrap();
        assert!(!assessment.var_breach && !assessment.volatility_outside_band);
        assert_relative_eq!(assessment.exposure_scale, 1.0, epsilon = 1.0e-12);

        // A shrinks to exactly the limit, not below.
        assert_relative_eq!(0.08 + adjustments["A"], 0.05, epsilon = 1.0e-12);
        // Freed weight lands on the unconstrained names; gross exposure holds.
        let adjusted_sum: f64 = positions
            .iter()
            .map(|p| p.weight + adjustments[&p.asset])
            .sum();
        assert_relative_eq!(adjusted_sum, 0.12, epsilon = 1.0e-9);
    }

    #[test]
    fn apply_adjustments_updates_the_whole_book() {
        let mut positions = vec![
            position("A", 0.08, "tech", 0.05),
            position("B", 0.02, "fin", 0.05),
        ];
        let mut adjustments = BTreeMap::new();
        adjustments.insert("A".to_string(), -0.03);
        adjustments.insert("B".to_string(), 0.03);

        RiskEngine::apply_adjustments(&mut positions, &adjustments);
        assert_relative_eq!(positions[0].weight, 0.05, epsilon = 1.0e-12);
        assert_relative_eq!(positions[1].weight, 0.05, epsilon = 1.0e-12);
    }

    #[test]
    fn illiquid_position_is_cut_to_the_liquidity_threshold() {
        let positions = vec![
            position("A", 0.04, "tech", 0.30),
            position("B", 0.03, "fin", 0.05),
            position("C", 0.03, "health", 0.05),
        ];
        let scenarios = alternating_scenarios(3, 200, 0.08);

        let mut eng = engine();
        let adjustments =
            eng.calculate_position_adjustments(&positions, &scenarios, &calm_state(1.0));

        // ADV consumption of 0.30 against a 0.15 threshold halves the position.
        assert_relative_eq!(0.04 + adjustments["A"], 0.02, epsilon = 1.0e-9);
    }

    #[test]
    fn sector_concentration_is_scaled_back_to_the_cap() {
        let positions: Vec<Position> = (0..6)
            .map(|i| position(&format!("T{i}"), 0.05, "tech", 0.05))
            .collect();
        let scenarios = alternating_scenarios(6, 200, 0.028);

        let mut eng = engine();
        let adjustments =
            eng.calculate_position_adjustments(&positions, &scenarios, &calm_state(1.0));

        let sector_total: f64 = positions
            .iter()
            .map(|p| p.weight + adjustments[&p.asset])
            .sum();
        assert!(
            sector_total <= 0.25 + 1.0e-9,
            "tech sector should be capped at 0.25, got {sector_total}"
        );
    }

    #[test]
    fn crisis_scaling_reduces_aggregate_exposure() {
        let positions = vec![
            position("A", 0.04, "tech", 0.05),
            position("B", 0.04, "fin", 0.05),
            position("C", 0.04, "health", 0.05),
        ];
        // Violent joint moves: vol far above the band forces net de-risking,
        // clamped at the lower scaling limit.
        let scenarios = alternating_scenarios(3, 200, 0.30);

        let mut eng = engine();
        let adjustments =
            eng.calculate_position_adjustments(&positions, &scenarios, &calm_state(0.4));

        let before: f64 = positions.iter().map(|p| p.weight).sum();
        let after: f64 = positions
            .iter()
            .map(|p| p.weight + adjustments[&p.asset])
            .sum();
        assert_relative_eq!(after / before, 0.5, epsilon = 1.0e-9);

        let assessment = eng.last_assessment().unwrap();
        assert_relative_eq!(assessment.exposure_scale, 0.5, epsilon = 1.0e-12);
        assert_relative_eq!(
            assessment.scaled_target_volatility,
            0.048,
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn risk_report_carries_utilization_ratios() {
        let positions = vec![
            position("A", 0.04, "tech", 0.05),
            position("B", 0.04, "fin", 0.05),
        ];
        let scenarios = alternating_scenarios(2, 200, 0.05);

        let mut eng = engine();
        assert!(eng.risk_report().is_none(), "no report before evaluation");
        eng.assess(&positions, &scenarios, &calm_state(1.0));

        let report = eng.risk_report().unwrap();
        assert!(report.contains_key("var_utilization"));
        assert!(report.contains_key("concentration_utilization"));
        assert_relative_eq!(
            report["var_utilization"],
            report["var"] / 0.12,
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn monitor_emits_alerts_for_breached_thresholds_only() {
        let eng = engine();
        let calm_snapshot = MarketSnapshot {
            intraday_drawdown: 0.005,
            volatility_ratio: 1.0,
            volume_ratio: 1.0,
            spread_ratio: 1.0,
            liquidity_ratio: 1.0,
            momentum_zscore: 0.2,
            mean_correlation: 0.3,
        };
        assert!(eng.monitor(&calm_snapshot).is_empty());

        let stressed_snapshot = MarketSnapshot {
            intraday_drawdown: 0.035,
            volatility_ratio: 1.8,
            volume_ratio: 2.4,
            spread_ratio: 2.5,
            liquidity_ratio: 0.3,
            momentum_zscore: -2.4,
            mean_correlation: 0.85,
        };
        let alerts = eng.monitor(&stressed_snapshot);
        assert_eq!(alerts.len(), 7);

        let drawdown = alerts
            .iter()
            .find(|a| a.metric == "intraday_drawdown")
            .unwrap();
        assert_eq!(drawdown.severity, AlertSeverity::Critical);
        let liquidity = alerts
            .iter()
            .find(|a| a.metric == "liquidity_reduction")
            .unwrap();
        assert_eq!(liquidity.severity, AlertSeverity::Critical);
    }

    #[test]
    fn snapshot_from_history_reflects_a_volatility_and_momentum_shift() {
        // 252 calm periods, then 21 periods of strong positive drift with
        // larger swings on two correlated series.
        let mut a = vec![0.0005; 273];
        let mut b = vec![0.0004; 273];
        for t in 252..273 {
            let swing = if t % 2 == 0 { 0.02 } else { -0.004 };
            a[t] = swing;
            b[t] = swing * 0.9;
        }
        let panel = ReturnPanel::new(
            vec!["A".to_string(), "B".to_string()],
            vec![a, b],
        )
        .unwrap();

        let snapshot = engine().snapshot_from_history(&panel, None);
        assert!(
            snapshot.volatility_ratio > 1.5,
            "recent swings should lift the volatility ratio, got {}",
            snapshot.volatility_ratio
        );
        assert!(
            snapshot.momentum_zscore > 1.5,
            "recent drift should register as momentum, got {}",
            snapshot.momentum_zscore
        );
        assert!(
            snapshot.mean_correlation > 0.75,
            "lockstep swings should raise correlation, got {}",
            snapshot.mean_correlation
        );
        assert!(snapshot.spread_ratio == 1.0 && snapshot.liquidity_ratio == 1.0);
    }

    #[test]
    fn monitor_includes_utilization_alerts_after_assessment() {
        let positions: Vec<Position> = (0..5)
            .map(|i| position(&format!("T{i}"), 0.05, "tech", 0.05))
            .collect();
        // 50% joint moves on a quarter-invested book push VaR utilization
        // past the alert threshold.
        let scenarios = alternating_scenarios(5, 200, 0.5);

        let mut eng = engine();
        eng.assess(&positions, &scenarios, &calm_state(1.0));

        let snapshot = MarketSnapshot {
            intraday_drawdown: 0.0,
            volatility_ratio: 1.0,
            volume_ratio: 1.0,
            spread_ratio: 1.0,
            liquidity_ratio: 1.0,
            momentum_zscore: 0.0,
            mean_correlation: 0.0,
        };
        let alerts = eng.monitor(&snapshot);
        assert!(alerts.iter().any(|a| a.metric == "var_utilization"));
    }
}
