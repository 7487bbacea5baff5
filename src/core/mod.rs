//! Shared domain types and library-wide error structures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named metrics and per-limit utilization ratios produced by the risk engine.
///
/// A `BTreeMap` keeps iteration order deterministic for reporting consumers.
pub type RiskReport = BTreeMap<String, f64>;

/// Time-aligned return history for a set of assets.
///
/// Layout is `returns[asset][period]`, oldest period first. The panel is
/// immutable once constructed; every series must have the same length and
/// contain only finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPanel {
    assets: Vec<String>,
    returns: Vec<Vec<f64>>,
}

impl ReturnPanel {
    /// Builds a validated panel from asset identifiers and aligned return series.
    ///
    /// # Errors
    /// Returns a [`DataError`] for empty input, misaligned series lengths,
    /// non-finite values, or duplicate asset identifiers.
    pub fn new(assets: Vec<String>, returns: Vec<Vec<f64>>) -> Result<Self, DataError> {
        if assets.is_empty() || returns.is_empty() {
            return Err(DataError::Empty);
        }
        if assets.len() != returns.len() {
            return Err(DataError::ShapeMismatch {
                assets: assets.len(),
                series: returns.len(),
            });
        }
        for i in 0..assets.len() {
            for j in (i + 1)..assets.len() {
                if assets[i] == assets[j] {
                    return Err(DataError::DuplicateAsset(assets[i].clone()));
                }
            }
        }

        let n_periods = returns[0].len();
        for (i, series) in returns.iter().enumerate() {
            if series.len() != n_periods {
                return Err(DataError::LengthMismatch {
                    asset: assets[i].clone(),
                    expected: n_periods,
                    actual: series.len(),
                });
            }
            if series.iter().any(|x| !x.is_finite()) {
                return Err(DataError::NonFinite {
                    asset: assets[i].clone(),
                });
            }
        }

        Ok(Self { assets, returns })
    }

    /// Asset identifiers, in column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Number of assets in the panel.
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of time periods per series.
    pub fn n_periods(&self) -> usize {
        self.returns[0].len()
    }

    /// Return series for one asset by column index.
    pub fn series(&self, asset: usize) -> &[f64] {
        &self.returns[asset]
    }

    /// All return series, `[asset][period]`.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.returns
    }

    /// A new panel restricted to the given asset column indices, preserving order.
    ///
    /// Indices out of range are skipped; the result is `None` when nothing survives.
    pub fn select(&self, indices: &[usize]) -> Option<Self> {
        let mut assets = Vec::with_capacity(indices.len());
        let mut returns = Vec::with_capacity(indices.len());
        for &i in indices {
            if i < self.assets.len() {
                assets.push(self.assets[i].clone());
                returns.push(self.returns[i].clone());
            }
        }
        if assets.is_empty() {
            None
        } else {
            Some(Self { assets, returns })
        }
    }
}

/// A single portfolio position, as seen by the risk engine.
///
/// `adv_fraction` is the fraction of the asset's average daily volume the
/// position would consume if liquidated over one day. Only the risk engine's
/// adjustment step mutates positions; detection and simulation never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Asset identifier, matching the return panel column.
    pub asset: String,
    /// Current portfolio weight.
    pub weight: f64,
    /// Sector bucket used for concentration limits.
    pub sector: String,
    /// Liquidity consumption as a fraction of average daily volume.
    pub adv_fraction: f64,
}

/// Alert severity, derived from how far beyond its threshold a metric sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Category of a monitoring alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertCategory {
    /// Intraday drawdown/volatility/volume threshold breaches.
    Intraday,
    /// Limit-utilization thresholds (VaR, concentration, correlation).
    Utilization,
    /// Market-condition shocks (spreads, liquidity, momentum).
    MarketCondition,
}

/// One monitoring alert. Produced by the risk engine's monitoring pass and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub category: AlertCategory,
    /// Name of the breached metric.
    pub metric: String,
    /// Observed metric value.
    pub value: f64,
    /// Threshold that was breached.
    pub threshold: f64,
    pub severity: AlertSeverity,
}

/// Input-data validation errors surfaced at the panel boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    /// No assets or no return series supplied.
    Empty,
    /// Asset identifier count does not match series count.
    ShapeMismatch { assets: usize, series: usize },
    /// One series has a different length than the first.
    LengthMismatch {
        asset: String,
        expected: usize,
        actual: usize,
    },
    /// A series contains NaN or infinite values.
    NonFinite { asset: String },
    /// The same asset identifier appears twice.
    DuplicateAsset(String),
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "return panel must contain at least one asset"),
            Self::ShapeMismatch { assets, series } => {
                write!(f, "{assets} asset ids supplied for {series} return series")
            }
            Self::LengthMismatch {
                asset,
                expected,
                actual,
            } => write!(
                f,
                "series for {asset} has {actual} periods, expected {expected}"
            ),
            Self::NonFinite { asset } => {
                write!(f, "series for {asset} contains non-finite values")
            }
            Self::DuplicateAsset(asset) => write!(f, "duplicate asset identifier {asset}"),
        }
    }
}

impl std::error::Error for DataError {}
