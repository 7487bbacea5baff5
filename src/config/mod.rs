//! Validated configuration tables for regime detection and risk limits.
//!
//! Every table is checked at construction; invalid configuration never reaches
//! the estimation pipeline. The built-in tables reproduce the standard
//! three-state (`calm`/`stress`/`crisis`) and four-state
//! (`low_volatility`/`trending`/`high_volatility`/`regime_shift`) schemes with
//! their detection and limit defaults.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::copula::CopulaFamily;
use crate::garch::Innovation;

const PRIOR_SUM_TOLERANCE: f64 = 1.0e-9;

/// Resolves an innovation-family name from external configuration.
///
/// # Errors
/// Unknown names fail fast with a [`ConfigError`] before any data is touched.
pub fn innovation_from_name(name: &str) -> Result<Innovation, ConfigError> {
    Innovation::from_str(name).map_err(ConfigError::InvalidParameter)
}

/// Resolves a copula-family name from external configuration.
///
/// # Errors
/// Unknown names fail fast with a [`ConfigError`] before any data is touched.
pub fn copula_family_from_name(name: &str) -> Result<CopulaFamily, ConfigError> {
    CopulaFamily::from_str(name).map_err(ConfigError::InvalidParameter)
}

/// One regime's priors, thresholds, and risk policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSpec {
    /// Regime label, e.g. `calm` or `high_volatility`.
    pub name: String,
    /// Prior probability of the regime (base rate, not a hard override).
    pub prior: f64,
    /// Annualized volatility level characteristic of the regime.
    pub volatility_threshold: f64,
    /// Mean pairwise correlation level characteristic of the regime.
    pub correlation_threshold: f64,
    /// Multiplier applied to the volatility target while the regime prevails.
    pub risk_scaling: f64,
    /// Human-readable description.
    pub description: String,
}

/// An ordered set of regimes forming one detection scheme.
///
/// Regimes are ordered from calmest to most stressed; volatility thresholds
/// must be strictly increasing in that order and priors must sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeScheme {
    pub regimes: Vec<RegimeSpec>,
}

impl RegimeScheme {
    /// Builds a validated scheme.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when priors do not sum to one, thresholds are
    /// out of order, or any parameter is non-finite or out of range.
    pub fn new(regimes: Vec<RegimeSpec>) -> Result<Self, ConfigError> {
        if regimes.len() < 2 {
            return Err(ConfigError::InvalidParameter(
                "a regime scheme requires at least two regimes".to_string(),
            ));
        }

        let sum: f64 = regimes.iter().map(|r| r.prior).sum();
        if (sum - 1.0).abs() > PRIOR_SUM_TOLERANCE {
            return Err(ConfigError::PriorsDoNotSumToOne { sum });
        }

        for r in &regimes {
            if !r.prior.is_finite() || r.prior <= 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "regime {} prior must be finite and > 0",
                    r.name
                )));
            }
            if !r.volatility_threshold.is_finite() || r.volatility_threshold <= 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "regime {} volatility threshold must be finite and > 0",
                    r.name
                )));
            }
            if !r.correlation_threshold.is_finite()
                || !(0.0..=1.0).contains(&r.correlation_threshold)
            {
                return Err(ConfigError::InvalidParameter(format!(
                    "regime {} correlation threshold must lie in [0, 1]",
                    r.name
                )));
            }
            if !r.risk_scaling.is_finite() || r.risk_scaling <= 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "regime {} risk scaling must be finite and > 0",
                    r.name
                )));
            }
        }

        for w in regimes.windows(2) {
            if w[1].volatility_threshold <= w[0].volatility_threshold {
                return Err(ConfigError::ThresholdOrdering(format!(
                    "volatility thresholds must increase from {} to {}",
                    w[0].name, w[1].name
                )));
            }
        }

        for i in 0..regimes.len() {
            for j in (i + 1)..regimes.len() {
                if regimes[i].name == regimes[j].name {
                    return Err(ConfigError::InvalidParameter(format!(
                        "duplicate regime name {}",
                        regimes[i].name
                    )));
                }
            }
        }

        Ok(Self { regimes })
    }

    /// Number of regimes in the scheme.
    pub fn len(&self) -> usize {
        self.regimes.len()
    }

    /// True when the scheme holds no regimes (never the case for validated schemes).
    pub fn is_empty(&self) -> bool {
        self.regimes.is_empty()
    }

    /// Index of a regime by label.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.regimes.iter().position(|r| r.name == name)
    }

    /// The standard three-state scheme: `calm`, `stress`, `crisis`.
    pub fn three_state() -> Self {
        Self::new(vec![
            RegimeSpec {
                name: "calm".to_string(),
                prior: 0.55,
                volatility_threshold: 0.10,
                correlation_threshold: 0.3,
                risk_scaling: 1.0,
                description: "Normal Market Conditions".to_string(),
            },
            RegimeSpec {
                name: "stress".to_string(),
                prior: 0.30,
                volatility_threshold: 0.20,
                correlation_threshold: 0.6,
                risk_scaling: 0.7,
                description: "Elevated Market Stress".to_string(),
            },
            RegimeSpec {
                name: "crisis".to_string(),
                prior: 0.15,
                volatility_threshold: 0.35,
                correlation_threshold: 0.8,
                risk_scaling: 0.4,
                description: "Crisis Conditions".to_string(),
            },
        ])
        .expect("built-in three-state scheme is valid")
    }

    /// The alternate four-state scheme: `low_volatility`, `trending`,
    /// `high_volatility`, `regime_shift`.
    pub fn four_state() -> Self {
        Self::new(vec![
            RegimeSpec {
                name: "low_volatility".to_string(),
                prior: 0.30,
                volatility_threshold: 0.10,
                correlation_threshold: 0.3,
                risk_scaling: 1.2,
                description: "Stable Market Phase".to_string(),
            },
            RegimeSpec {
                name: "trending".to_string(),
                prior: 0.45,
                volatility_threshold: 0.15,
                correlation_threshold: 0.5,
                risk_scaling: 1.0,
                description: "Directional Market Movement".to_string(),
            },
            RegimeSpec {
                name: "high_volatility".to_string(),
                prior: 0.20,
                volatility_threshold: 0.25,
                correlation_threshold: 0.7,
                risk_scaling: 0.8,
                description: "Market Stress Period".to_string(),
            },
            RegimeSpec {
                name: "regime_shift".to_string(),
                prior: 0.05,
                volatility_threshold: 0.35,
                correlation_threshold: 0.8,
                risk_scaling: 0.5,
                description: "Regime Transition Phase".to_string(),
            },
        ])
        .expect("built-in four-state scheme is valid")
    }
}

/// Detection parameters shared by all schemes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Lookback window lengths in periods.
    pub windows: Vec<usize>,
    /// Minimum history required before detection runs.
    pub minimum_history: usize,
    /// Exponential decay factor for recency weighting, in (0, 1).
    pub decay_factor: f64,
    /// Posterior confidence required for a high-confidence classification.
    pub confidence_threshold: f64,
    /// Minimum periods a regime must persist before it can be displaced.
    pub regime_persistence: usize,
    /// Blend new posteriors with the previous state's posteriors.
    pub transition_smoothing: bool,
}

impl DetectionConfig {
    /// Builds a validated detection configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for empty windows, windows longer than the
    /// minimum history, a decay factor outside (0, 1), a confidence threshold
    /// outside (0, 1), or zero persistence.
    pub fn new(
        windows: Vec<usize>,
        minimum_history: usize,
        decay_factor: f64,
        confidence_threshold: f64,
        regime_persistence: usize,
        transition_smoothing: bool,
    ) -> Result<Self, ConfigError> {
        if windows.is_empty() {
            return Err(ConfigError::InvalidParameter(
                "at least one lookback window is required".to_string(),
            ));
        }
        if windows.iter().any(|&w| w < 2) {
            return Err(ConfigError::InvalidParameter(
                "lookback windows must be >= 2 periods".to_string(),
            ));
        }
        if windows.iter().any(|&w| w > minimum_history) {
            return Err(ConfigError::ThresholdOrdering(
                "minimum history must cover the longest lookback window".to_string(),
            ));
        }
        if !decay_factor.is_finite() || !(0.0..1.0).contains(&decay_factor) || decay_factor == 0.0 {
            return Err(ConfigError::InvalidParameter(
                "decay factor must lie in (0, 1)".to_string(),
            ));
        }
        if !confidence_threshold.is_finite() || !(0.0..1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidParameter(
                "confidence threshold must lie in (0, 1)".to_string(),
            ));
        }
        if regime_persistence == 0 {
            return Err(ConfigError::InvalidParameter(
                "regime persistence must be >= 1 period".to_string(),
            ));
        }

        Ok(Self {
            windows,
            minimum_history,
            decay_factor,
            confidence_threshold,
            regime_persistence,
            transition_smoothing,
        })
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::new(vec![21, 63, 252], 252, 0.94, 0.75, 5, true)
            .expect("default detection config is valid")
    }
}

/// Portfolio-level loss limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLimits {
    /// Maximum tolerated drawdown.
    pub max_drawdown: f64,
    /// Value-at-Risk limit at `var_confidence`.
    pub var_limit: f64,
    /// Expected-shortfall threshold at `var_confidence`.
    pub expected_shortfall: f64,
    /// Maximum single-sector concentration.
    pub concentration_limit: f64,
    /// Confidence level for VaR/ES, in (0, 1).
    pub var_confidence: f64,
}

/// Volatility-targeting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityLimits {
    /// Annualized volatility target.
    pub target: f64,
    /// Acceptable volatility band `(lower, upper)`; no scaling inside the band.
    pub band: (f64, f64),
    /// Bounds on any position-scaling multiplier `(lower, upper)`.
    pub scaling_limits: (f64, f64),
}

/// Per-position limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionLimits {
    /// Maximum single-name weight.
    pub max_single_name: f64,
    /// Minimum single-name weight.
    pub min_single_name: f64,
    /// Maximum aggregate sector weight.
    pub max_sector: f64,
    /// Maximum position size as a fraction of average daily volume.
    pub liquidity_threshold: f64,
}

/// Momentum signal windows used by monitoring diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Short momentum window in periods.
    pub short_window: usize,
    /// Long momentum window in periods.
    pub long_window: usize,
    /// Z-score magnitude treated as a meaningful signal.
    pub signal_threshold: f64,
}

/// Alert thresholds evaluated by the monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitoringThresholds {
    /// Intraday drawdown triggering an alert.
    pub intraday_drawdown: f64,
    /// Ratio of intraday to baseline volatility triggering an alert.
    pub intraday_volatility_ratio: f64,
    /// Ratio of intraday to baseline volume triggering an alert.
    pub intraday_volume_ratio: f64,
    /// Fraction of the concentration limit at which to alert.
    pub concentration_utilization: f64,
    /// Fraction of the VaR limit at which to alert.
    pub var_utilization: f64,
    /// Mean pairwise correlation level signalling a correlation break.
    pub correlation_level: f64,
    /// Ratio of observed to baseline spreads triggering an alert.
    pub spread_widening_ratio: f64,
    /// Observed/baseline liquidity ratio below which to alert.
    pub liquidity_reduction_ratio: f64,
    /// Momentum z-score magnitude triggering a reversal alert.
    pub momentum_zscore: f64,
}

/// Full static risk-limit configuration. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub portfolio: PortfolioLimits,
    pub volatility: VolatilityLimits,
    pub position: PositionLimits,
    pub momentum: MomentumConfig,
    pub monitoring: MonitoringThresholds,
}

impl RiskLimits {
    /// Validates a limit configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for non-finite or non-positive limits,
    /// inverted bands or bounds, or a confidence level outside (0, 1).
    pub fn validated(self) -> Result<Self, ConfigError> {
        let p = &self.portfolio;
        for (name, v) in [
            ("max_drawdown", p.max_drawdown),
            ("var_limit", p.var_limit),
            ("expected_shortfall", p.expected_shortfall),
            ("concentration_limit", p.concentration_limit),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "portfolio {name} must be finite and > 0"
                )));
            }
        }
        if !p.var_confidence.is_finite() || !(0.0..1.0).contains(&p.var_confidence) {
            return Err(ConfigError::InvalidParameter(
                "var confidence must lie in (0, 1)".to_string(),
            ));
        }

        let v = &self.volatility;
        if !v.target.is_finite() || v.target <= 0.0 {
            return Err(ConfigError::InvalidParameter(
                "volatility target must be finite and > 0".to_string(),
            ));
        }
        if v.band.0 <= 0.0 || v.band.0 >= v.band.1 {
            return Err(ConfigError::ThresholdOrdering(
                "volatility band must satisfy 0 < lower < upper".to_string(),
            ));
        }
        if v.scaling_limits.0 <= 0.0 || v.scaling_limits.0 >= v.scaling_limits.1 {
            return Err(ConfigError::ThresholdOrdering(
                "scaling limits must satisfy 0 < lower < upper".to_string(),
            ));
        }

        let pos = &self.position;
        if pos.min_single_name <= 0.0 || pos.min_single_name >= pos.max_single_name {
            return Err(ConfigError::ThresholdOrdering(
                "position weights must satisfy 0 < min_single_name < max_single_name".to_string(),
            ));
        }
        if !pos.max_sector.is_finite() || pos.max_sector <= 0.0 || pos.max_sector > 1.0 {
            return Err(ConfigError::InvalidParameter(
                "max sector weight must lie in (0, 1]".to_string(),
            ));
        }
        if !pos.liquidity_threshold.is_finite() || pos.liquidity_threshold <= 0.0 {
            return Err(ConfigError::InvalidParameter(
                "liquidity threshold must be finite and > 0".to_string(),
            ));
        }

        if self.momentum.short_window == 0 || self.momentum.short_window >= self.momentum.long_window
        {
            return Err(ConfigError::ThresholdOrdering(
                "momentum windows must satisfy 0 < short < long".to_string(),
            ));
        }

        Ok(self)
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            portfolio: PortfolioLimits {
                max_drawdown: 0.15,
                var_limit: 0.12,
                expected_shortfall: 0.20,
                concentration_limit: 0.25,
                var_confidence: 0.95,
            },
            volatility: VolatilityLimits {
                target: 0.12,
                band: (0.08, 0.15),
                scaling_limits: (0.5, 2.0),
            },
            position: PositionLimits {
                max_single_name: 0.05,
                min_single_name: 0.01,
                max_sector: 0.25,
                liquidity_threshold: 0.15,
            },
            momentum: MomentumConfig {
                short_window: 21,
                long_window: 252,
                signal_threshold: 1.5,
            },
            monitoring: MonitoringThresholds {
                intraday_drawdown: 0.02,
                intraday_volatility_ratio: 1.5,
                intraday_volume_ratio: 2.0,
                concentration_utilization: 0.8,
                var_utilization: 0.9,
                correlation_level: 0.75,
                spread_widening_ratio: 2.0,
                liquidity_reduction_ratio: 0.5,
                momentum_zscore: 2.0,
            },
        }
    }
}

/// Configuration errors. Fatal, raised at construction, never mid-pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Regime priors do not sum to one.
    PriorsDoNotSumToOne { sum: f64 },
    /// A threshold or bound ordering constraint is violated.
    ThresholdOrdering(String),
    /// A parameter is non-finite or out of its valid domain.
    InvalidParameter(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorsDoNotSumToOne { sum } => {
                write!(f, "regime priors must sum to 1.0, got {sum}")
            }
            Self::ThresholdOrdering(msg) => write!(f, "threshold ordering: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
