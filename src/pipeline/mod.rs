//! End-to-end orchestration of the estimation pipeline.
//!
//! One run fans out the per-asset marginal fits (in parallel under the
//! `parallel` feature), joins the results, estimates the copula over the
//! surviving residuals, simulates forward scenarios, and evaluates the risk
//! engine under the detected regime.
//!
//! Per-asset estimation failures never crash the run when other assets fit:
//! they are collected and reported, and the downstream copula/simulation
//! steps either exclude the failed assets (the default) or abort, per the
//! configured [`FailurePolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DetectionConfig, RegimeScheme, RiskLimits};
use crate::copula::{CopulaError, CopulaEstimator, CopulaFamily, CopulaModel};
use crate::core::{Alert, Position, ReturnPanel, RiskReport};
use crate::garch::{self, GarchError, GarchFitOptions, Innovation, MarginalModel};
use crate::regime::{RegimeDetector, RegimeError, RegimeState};
use crate::risk::{RiskAssessment, RiskEngine};
use crate::simulate::{ScenarioSimulator, SimulationError};

/// How the pipeline treats assets whose marginal fit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Drop failed assets from the copula and simulation steps and report
    /// them alongside the result. The default.
    ExcludeFailed,
    /// Abort the whole run on the first failed marginal fit.
    Abort,
}

/// Static pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub innovation: Innovation,
    pub copula_family: CopulaFamily,
    pub n_scenarios: usize,
    pub horizon: usize,
    /// Base simulation seed; `None` uses process entropy (non-reproducible).
    pub seed: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub garch: GarchFitOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            innovation: Innovation::SkewT,
            copula_family: CopulaFamily::StudentT,
            n_scenarios: 10_000,
            horizon: 10,
            seed: None,
            failure_policy: FailurePolicy::ExcludeFailed,
            garch: GarchFitOptions::default(),
        }
    }
}

/// One asset's failed marginal fit.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalFailure {
    pub asset: String,
    pub error: GarchError,
}

/// The full output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub regime: RegimeState,
    /// Surviving marginal models in panel order.
    pub marginals: Vec<(String, MarginalModel)>,
    pub failures: Vec<MarginalFailure>,
    pub copula: CopulaModel,
    pub assessment: RiskAssessment,
    pub report: RiskReport,
    /// Proposed weight deltas for assets with usable models.
    pub adjustments: BTreeMap<String, f64>,
}

/// Pipeline errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Config(ConfigError),
    Regime(RegimeError),
    /// First failed marginal under [`FailurePolicy::Abort`].
    Marginal { asset: String, source: GarchError },
    /// Every asset's marginal fit failed.
    NoUsableMarginals { failures: Vec<MarginalFailure> },
    Copula(CopulaError),
    Simulation(SimulationError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration: {err}"),
            Self::Regime(err) => write!(f, "regime detection: {err}"),
            Self::Marginal { asset, source } => {
                write!(f, "marginal fit for {asset} failed: {source}")
            }
            Self::NoUsableMarginals { failures } => {
                write!(f, "all {} marginal fits failed", failures.len())
            }
            Self::Copula(err) => write!(f, "copula estimation: {err}"),
            Self::Simulation(err) => write!(f, "scenario simulation: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RegimeError> for PipelineError {
    fn from(err: RegimeError) -> Self {
        Self::Regime(err)
    }
}

impl From<CopulaError> for PipelineError {
    fn from(err: CopulaError) -> Self {
        Self::Copula(err)
    }
}

impl From<SimulationError> for PipelineError {
    fn from(err: SimulationError) -> Self {
        Self::Simulation(err)
    }
}

/// Full detection-estimation-simulation-risk pipeline.
///
/// The detector's retained regime state is the only mutable state carried
/// across runs; `run` takes `&mut self` so one evaluation cycle completes
/// before the next begins.
#[derive(Debug, Clone)]
pub struct RiskPipeline {
    detector: RegimeDetector,
    engine: RiskEngine,
    config: PipelineConfig,
}

impl RiskPipeline {
    /// Builds a pipeline from validated components.
    ///
    /// # Errors
    /// Propagates [`ConfigError`] from the risk-limit validation.
    pub fn new(
        scheme: RegimeScheme,
        detection: DetectionConfig,
        limits: RiskLimits,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            detector: RegimeDetector::new(scheme, detection),
            engine: RiskEngine::new(limits)?,
            config,
        })
    }

    pub fn detector(&self) -> &RegimeDetector {
        &self.detector
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    /// Clears the retained regime state.
    pub fn reset_regime_state(&mut self) {
        self.detector.reset();
    }

    /// Continuous monitoring pass: derives an intraday snapshot from the
    /// trailing history and evaluates the alert thresholds. Produces alerts
    /// only; neither positions nor retained state are touched.
    pub fn monitor(&self, panel: &ReturnPanel, volumes: Option<&[Vec<f64>]>) -> Vec<Alert> {
        let snapshot = self.engine.snapshot_from_history(panel, volumes);
        self.engine.monitor(&snapshot)
    }

    /// Runs one full evaluation cycle.
    ///
    /// `positions` are matched to panel assets by identifier; surviving
    /// assets without a position enter the book at zero weight, and positions
    /// without a usable model are left untouched by the adjustments.
    ///
    /// # Errors
    /// See [`PipelineError`]; with [`FailurePolicy::ExcludeFailed`] the run
    /// only fails when no asset fits at all or a downstream step fails.
    pub fn run(
        &mut self,
        panel: &ReturnPanel,
        volumes: Option<&[Vec<f64>]>,
        positions: &[Position],
    ) -> Result<PipelineReport, PipelineError> {
        let regime = self.detector.detect(panel, volumes)?;

        let fits = garch::fit_all(panel, self.config.innovation, &self.config.garch);

        let mut marginals: Vec<(String, MarginalModel)> = Vec::new();
        let mut survivors: Vec<usize> = Vec::new();
        let mut failures: Vec<MarginalFailure> = Vec::new();
        for (i, fit) in fits.into_iter().enumerate() {
            let asset = panel.assets()[i].clone();
            match fit {
                Ok(model) => {
                    survivors.push(i);
                    marginals.push((asset, model));
                }
                Err(error) => {
                    if self.config.failure_policy == FailurePolicy::Abort {
                        return Err(PipelineError::Marginal {
                            asset,
                            source: error,
                        });
                    }
                    failures.push(MarginalFailure { asset, error });
                }
            }
        }
        if marginals.is_empty() {
            return Err(PipelineError::NoUsableMarginals { failures });
        }

        let models: Vec<MarginalModel> = marginals.iter().map(|(_, m)| m.clone()).collect();
        let copula = CopulaEstimator::new(self.config.copula_family).estimate(&models)?;

        let mut simulator = ScenarioSimulator::new(self.config.n_scenarios, self.config.horizon);
        simulator.seed = self.config.seed;
        let scenarios = simulator.simulate(&copula, &models)?;

        // Align the book with the surviving asset columns.
        let aligned: Vec<Position> = marginals
            .iter()
            .map(|(asset, _)| {
                positions
                    .iter()
                    .find(|p| &p.asset == asset)
                    .cloned()
                    .unwrap_or_else(|| Position {
                        asset: asset.clone(),
                        weight: 0.0,
                        sector: "unassigned".to_string(),
                        adv_fraction: 0.0,
                    })
            })
            .collect();

        let adjustments = self
            .engine
            .calculate_position_adjustments(&aligned, &scenarios, &regime);
        let assessment = self
            .engine
            .last_assessment()
            .cloned()
            .expect("assessment ran in this cycle");
        let report = self
            .engine
            .risk_report()
            .expect("report follows the assessment");

        Ok(PipelineReport {
            regime,
            marginals,
            failures,
            copula,
            assessment,
            report,
            adjustments,
        })
    }
}
