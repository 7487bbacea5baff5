//! Per-asset conditional volatility models.
//!
//! Fits a GARCH(1,1) variance recursion by quasi-maximum likelihood and the
//! innovation distribution (gaussian, Student-t, or Hansen skew-t) by a
//! second-stage MLE over the standardized residuals. The fitted model exposes
//! the residual series for copula estimation and the quantile function used by
//! inverse-transform scenario sampling.
//!
//! References:
//! - Bollerslev (1986), the GARCH(1,1) recursion.
//! - Hansen (1994), skewed Student-t innovations.
//! - Joe (1997), two-stage inference functions for margins.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::core::ReturnPanel;
use crate::math::{
    fit_skew_t_shape, fit_student_t_shape, normal_cdf, normal_inv_cdf, sample_mean,
    sample_variance, skew_t_cdf, skew_t_log_pdf, skew_t_quantile, student_t_std_cdf,
    student_t_std_log_pdf, student_t_std_quantile,
};
use crate::optimize::{BoxConstraints, ConvergenceInfo, NelderMeadOptions, nelder_mead};

const MIN_VARIANCE: f64 = 1.0e-18;
const STATIONARITY_CAP: f64 = 0.9995;
const PENALIZED_OBJECTIVE: f64 = 1.0e6;

/// Innovation distribution family for a marginal model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Innovation {
    Gaussian,
    StudentT,
    SkewT,
}

impl Innovation {
    /// Short identifier used in reports and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::StudentT => "student_t",
            Self::SkewT => "skew_t",
        }
    }
}

impl std::str::FromStr for Innovation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gaussian" | "normal" => Ok(Self::Gaussian),
            "student_t" | "student" => Ok(Self::StudentT),
            "skew_t" | "skewed" => Ok(Self::SkewT),
            other => Err(format!("unknown innovation family {other}")),
        }
    }
}

/// GARCH(1,1) variance-recursion parameters:
/// `sigma^2_t = omega + alpha * eps^2_{t-1} + beta * sigma^2_{t-1}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Garch11Params {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Garch11Params {
    /// ARCH + GARCH persistence; stationarity requires this < 1.
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Long-run variance implied by the recursion.
    pub fn unconditional_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence()).max(1.0e-12)
    }
}

/// Fitted innovation distribution with family-specific shape parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FittedInnovation {
    Gaussian,
    StudentT { degrees_of_freedom: f64 },
    SkewT { degrees_of_freedom: f64, skew_lambda: f64 },
}

impl FittedInnovation {
    pub fn family(&self) -> Innovation {
        match self {
            Self::Gaussian => Innovation::Gaussian,
            Self::StudentT { .. } => Innovation::StudentT,
            Self::SkewT { .. } => Innovation::SkewT,
        }
    }

    /// Quantile of the standardized (zero-mean, unit-variance) innovation.
    pub fn quantile(&self, u: f64) -> f64 {
        match *self {
            Self::Gaussian => normal_inv_cdf(u),
            Self::StudentT { degrees_of_freedom } => student_t_std_quantile(u, degrees_of_freedom),
            Self::SkewT {
                degrees_of_freedom,
                skew_lambda,
            } => skew_t_quantile(u, degrees_of_freedom, skew_lambda),
        }
    }

    /// CDF of the standardized innovation, used for probability integral
    /// transforms in copula estimation.
    pub fn cdf(&self, z: f64) -> f64 {
        match *self {
            Self::Gaussian => normal_cdf(z),
            Self::StudentT { degrees_of_freedom } => student_t_std_cdf(z, degrees_of_freedom),
            Self::SkewT {
                degrees_of_freedom,
                skew_lambda,
            } => skew_t_cdf(z, degrees_of_freedom, skew_lambda),
        }
    }

    /// Log-density of the standardized innovation.
    pub fn log_pdf(&self, z: f64) -> f64 {
        match *self {
            Self::Gaussian => -0.5 * (2.0 * PI).ln() - 0.5 * z * z,
            Self::StudentT { degrees_of_freedom } => student_t_std_log_pdf(z, degrees_of_freedom),
            Self::SkewT {
                degrees_of_freedom,
                skew_lambda,
            } => skew_t_log_pdf(z, degrees_of_freedom, skew_lambda),
        }
    }
}

/// A fitted marginal volatility model for one asset.
///
/// Immutable after fitting; refits produce a fresh model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalModel {
    /// Sample mean removed before the variance recursion.
    pub mean: f64,
    pub params: Garch11Params,
    pub innovation: FittedInnovation,
    /// In-sample standardized residuals `(r_t - mean) / sigma_t`.
    pub residuals: Vec<f64>,
    /// In-sample conditional standard deviations.
    pub conditional_vol: Vec<f64>,
    /// One-step-ahead conditional variance forecast.
    pub forecast_variance: f64,
    /// Total in-sample log-likelihood under the fitted innovation density.
    pub log_likelihood: f64,
    pub convergence: ConvergenceInfo,
}

impl MarginalModel {
    /// One-step-ahead conditional volatility forecast (per period).
    pub fn forecast_vol(&self) -> f64 {
        self.forecast_variance.max(0.0).sqrt()
    }

    /// Standardized innovation quantile, for inverse-transform sampling.
    pub fn quantile(&self, u: f64) -> f64 {
        self.innovation.quantile(u)
    }

    /// Probability integral transform of one standardized residual.
    pub fn innovation_cdf(&self, z: f64) -> f64 {
        self.innovation.cdf(z)
    }
}

/// Options for a marginal fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchFitOptions {
    /// Minimum observations (model order plus burn-in).
    pub min_observations: usize,
    pub optimizer: NelderMeadOptions,
}

impl Default for GarchFitOptions {
    fn default() -> Self {
        Self {
            min_observations: 30,
            optimizer: NelderMeadOptions {
                max_iterations: 800,
                tolerance: 1.0e-9,
                ..NelderMeadOptions::default()
            },
        }
    }
}

/// Marginal-model estimation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum GarchError {
    /// Not enough observations for the requested fit.
    InsufficientData { required: usize, actual: usize },
    /// The optimizer did not converge, or the optimum violates stationarity.
    /// Carries the last-best parameters for diagnostics.
    NonConvergence {
        last_params: Garch11Params,
        iterations: usize,
        detail: String,
    },
    /// Malformed input (non-finite or degenerate series).
    InvalidInput(String),
}

impl std::fmt::Display for GarchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData { required, actual } => {
                write!(f, "insufficient data: {actual} observations, need {required}")
            }
            Self::NonConvergence {
                last_params,
                iterations,
                detail,
            } => write!(
                f,
                "garch fit did not converge after {iterations} iterations ({detail}); \
                 last parameters omega={:.3e} alpha={:.4} beta={:.4}",
                last_params.omega, last_params.alpha, last_params.beta
            ),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for GarchError {}

/// Negative mean Gaussian log-likelihood of the GARCH(1,1) recursion.
///
/// Stationarity is enforced by penalty so the simplex never settles on an
/// explosive parameterization.
fn negative_mean_log_likelihood(x: &[f64], centered: &[f64], initial_variance: f64) -> f64 {
    let (omega, alpha, beta) = (x[0], x[1], x[2]);
    if alpha + beta >= STATIONARITY_CAP {
        return PENALIZED_OBJECTIVE * (1.0 + alpha + beta - STATIONARITY_CAP);
    }

    let mut v = initial_variance.max(MIN_VARIANCE);
    let mut ll = 0.0;
    for &eps in centered {
        ll += -0.5 * ((2.0 * PI * v).ln() + eps * eps / v);
        v = (omega + alpha * eps * eps + beta * v).max(MIN_VARIANCE);
    }

    -ll / centered.len() as f64
}

/// Fits a GARCH(1,1) marginal model with the requested innovation family.
///
/// The variance recursion is estimated by Gaussian quasi-MLE with a bounded
/// Nelder-Mead search; for Student-t and skew-t innovations the shape
/// parameters are then fitted by grid MLE over the standardized residuals.
///
/// # Errors
/// - [`GarchError::InsufficientData`] when fewer than
///   `options.min_observations` returns are supplied.
/// - [`GarchError::NonConvergence`] when the optimizer hits its iteration cap
///   or the optimum violates stationarity; the last-best parameters are
///   attached, never silently substituted.
/// - [`GarchError::InvalidInput`] for non-finite or constant series.
pub fn fit(
    returns: &[f64],
    innovation: Innovation,
    options: &GarchFitOptions,
) -> Result<MarginalModel, GarchError> {
    if returns.len() < options.min_observations {
        return Err(GarchError::InsufficientData {
            required: options.min_observations,
            actual: returns.len(),
        });
    }
    if returns.iter().any(|x| !x.is_finite()) {
        return Err(GarchError::InvalidInput(
            "returns contain non-finite values".to_string(),
        ));
    }

    let mean = sample_mean(returns);
    let centered: Vec<f64> = returns.iter().map(|r| r - mean).collect();
    let variance = sample_variance(&centered);
    if variance <= MIN_VARIANCE {
        return Err(GarchError::InvalidInput(
            "return series is constant".to_string(),
        ));
    }

    let bounds = BoxConstraints::new(
        vec![variance * 1.0e-6, 1.0e-6, 0.0],
        vec![variance * 4.0, 0.995, 0.995],
    )
    .expect("garch bounds are well-formed");
    let initial = [variance * 0.05, 0.08, 0.88];

    let result = nelder_mead(&initial, &bounds, options.optimizer, |x| {
        negative_mean_log_likelihood(x, &centered, variance)
    })
    .map_err(GarchError::InvalidInput)?;

    let params = Garch11Params {
        omega: result.x[0],
        alpha: result.x[1],
        beta: result.x[2],
    };

    if !result.convergence.converged {
        return Err(GarchError::NonConvergence {
            last_params: params,
            iterations: result.convergence.iterations,
            detail: format!("{:?}", result.convergence.reason),
        });
    }
    if params.persistence() >= 1.0 {
        return Err(GarchError::NonConvergence {
            last_params: params,
            iterations: result.convergence.iterations,
            detail: "optimum violates stationarity".to_string(),
        });
    }

    // Rebuild the in-sample variance path under the fitted parameters.
    let mut conditional_vol = Vec::with_capacity(centered.len());
    let mut residuals = Vec::with_capacity(centered.len());
    let mut v = variance.max(MIN_VARIANCE);
    for &eps in &centered {
        let sigma = v.sqrt();
        conditional_vol.push(sigma);
        residuals.push(eps / sigma);
        v = (params.omega + params.alpha * eps * eps + params.beta * v).max(MIN_VARIANCE);
    }
    let forecast_variance = v;

    let fitted = match innovation {
        Innovation::Gaussian => FittedInnovation::Gaussian,
        Innovation::StudentT => {
            let shape = fit_student_t_shape(&residuals);
            FittedInnovation::StudentT {
                degrees_of_freedom: shape.degrees_of_freedom,
            }
        }
        Innovation::SkewT => {
            let shape = fit_skew_t_shape(&residuals);
            FittedInnovation::SkewT {
                degrees_of_freedom: shape.degrees_of_freedom,
                skew_lambda: shape.skew_lambda,
            }
        }
    };

    let shape_ll: f64 = residuals.iter().map(|&z| fitted.log_pdf(z)).sum();
    let sum_ln_sigma: f64 = conditional_vol.iter().map(|s| s.ln()).sum();

    Ok(MarginalModel {
        mean,
        params,
        innovation: fitted,
        residuals,
        conditional_vol,
        forecast_variance,
        log_likelihood: shape_ll - sum_ln_sigma,
        convergence: result.convergence,
    })
}

/// Fits marginal models for every asset in a panel.
///
/// Fits are independent and run in parallel under the `parallel` feature.
/// Per-asset failures are returned in place, never allowed to abort the
/// other fits; the caller decides how to treat partial success.
pub fn fit_all(
    panel: &ReturnPanel,
    innovation: Innovation,
    options: &GarchFitOptions,
) -> Vec<Result<MarginalModel, GarchError>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        panel
            .rows()
            .par_iter()
            .map(|series| fit(series, innovation, options))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        panel
            .rows()
            .iter()
            .map(|series| fit(series, innovation, options))
            .collect()
    }
}
