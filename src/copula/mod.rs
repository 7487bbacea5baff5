//! Copula dependence estimation over standardized residuals.
//!
//! Implements the second step of the IFM procedure: residuals from fitted
//! marginal models are mapped to uniform margins through their innovation
//! CDFs (probability integral transform), then the copula parameters are
//! fitted by maximum likelihood over the uniform observations.
//!
//! Families:
//! - `gaussian` / `student_t`: correlation matrix from normal scores, with a
//!   Higham nearest-correlation repair (reported as a warning) when the
//!   estimate is not positive semidefinite; Student-t degrees of freedom by
//!   1-D grid MLE with the correlation held fixed.
//! - `clayton` / `gumbel`: single tail-dependence parameter by
//!   pairwise-averaged bivariate MLE over a bounded grid. An argmax pinned at
//!   an open domain boundary is a fit failure carrying the last-best value.
//!
//! References:
//! - Joe (1997), multivariate models and dependence concepts.
//! - Jondeau and Rockinger (2006), copula-GARCH estimation.
//! - Demarta and McNeil (2005), the t copula.

pub mod sampler;

pub use sampler::CopulaSampler;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::gamma::ln_gamma;

use crate::garch::MarginalModel;
use crate::math::{
    PsdProjectionConfig, is_positive_semidefinite, min_symmetric_eigenvalue, nearest_correlation,
    normal_inv_cdf, validate_correlation,
};

/// Clamp applied to uniform observations before likelihood evaluation.
const UNIFORM_EPS: f64 = 1.0e-9;
/// Off-diagonal clamp keeping estimated correlation matrices positive definite.
const MAX_OFF_DIAGONAL: f64 = 0.999_999;
const PSD_TOLERANCE: f64 = 1.0e-10;
const MIN_OBSERVATIONS: usize = 20;
/// Clayton dependence below this level is indistinguishable from the open
/// boundary at zero and is reported as a fit failure.
const CLAYTON_MIN_DEPENDENCE: f64 = 0.10;

/// Copula family for dependence estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopulaFamily {
    /// Symmetric, no tail dependence.
    Gaussian,
    /// Symmetric tail dependence, estimated degrees of freedom.
    StudentT,
    /// Lower-tail dependence, parameter > 0.
    Clayton,
    /// Upper-tail dependence, parameter >= 1.
    Gumbel,
}

impl CopulaFamily {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::StudentT => "student_t",
            Self::Clayton => "clayton",
            Self::Gumbel => "gumbel",
        }
    }
}

impl std::str::FromStr for CopulaFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gaussian" => Ok(Self::Gaussian),
            "student_t" | "student-t" => Ok(Self::StudentT),
            "clayton" => Ok(Self::Clayton),
            "gumbel" => Ok(Self::Gumbel),
            other => Err(format!("unknown copula family {other}")),
        }
    }
}

/// Family-specific fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CopulaParams {
    Gaussian {
        /// Row-major correlation matrix.
        correlation: Vec<Vec<f64>>,
    },
    StudentT {
        correlation: Vec<Vec<f64>>,
        degrees_of_freedom: f64,
    },
    Clayton {
        theta: f64,
    },
    Gumbel {
        theta: f64,
    },
}

/// Recoverable estimation warnings attached to a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CopulaWarning {
    /// The raw correlation estimate was not positive semidefinite; the
    /// nearest valid correlation matrix was substituted.
    DegenerateCorrelation { min_eigenvalue: f64 },
}

/// A fitted copula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaModel {
    pub family: CopulaFamily,
    pub params: CopulaParams,
    /// Log-likelihood at the optimum. For archimedean families on more than
    /// two assets this is the pairwise-averaged bivariate log-likelihood.
    pub log_likelihood: f64,
    pub n_assets: usize,
    pub warnings: Vec<CopulaWarning>,
}

/// Copula estimation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CopulaError {
    /// Malformed input (misaligned residuals, out-of-range uniforms, too few
    /// observations or assets).
    InvalidInput(String),
    /// The likelihood surface has no interior maximum within the family's
    /// valid parameter domain. Carries the last-best parameter value.
    FitFailure {
        family: CopulaFamily,
        last_best: f64,
        detail: String,
    },
    /// Numerical issue (singular correlation, failed projection).
    NumericalError(String),
}

impl std::fmt::Display for CopulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::FitFailure {
                family,
                last_best,
                detail,
            } => write!(
                f,
                "{} copula fit failed: {detail}; last-best parameter {last_best}",
                family.name()
            ),
            Self::NumericalError(msg) => write!(f, "numerical error: {msg}"),
        }
    }
}

impl std::error::Error for CopulaError {}

/// Grid bounds for the family-specific parameter searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaFitOptions {
    /// Degrees-of-freedom search range for the Student-t copula.
    pub dof_range: (f64, f64),
    pub dof_steps: usize,
    /// Clayton parameter search range; the lower edge approximates the open
    /// boundary at zero.
    pub clayton_range: (f64, f64),
    /// Gumbel parameter search range; the lower edge (1) is the valid
    /// independence limit.
    pub gumbel_range: (f64, f64),
    pub theta_steps: usize,
    pub projection: PsdProjectionConfig,
}

impl Default for CopulaFitOptions {
    fn default() -> Self {
        Self {
            dof_range: (2.1, 50.0),
            dof_steps: 96,
            clayton_range: (0.01, 30.0),
            gumbel_range: (1.0, 30.0),
            theta_steps: 240,
            projection: PsdProjectionConfig::default(),
        }
    }
}

/// Two-step (IFM) copula estimator.
#[derive(Debug, Clone)]
pub struct CopulaEstimator {
    pub family: CopulaFamily,
    pub options: CopulaFitOptions,
}

impl CopulaEstimator {
    pub fn new(family: CopulaFamily) -> Self {
        Self {
            family,
            options: CopulaFitOptions::default(),
        }
    }

    /// Estimates the copula over the standardized residuals of fitted
    /// marginal models (columns aligned on the same time index).
    ///
    /// # Errors
    /// [`CopulaError::InvalidInput`] for empty or misaligned residual series;
    /// estimation errors as for [`CopulaEstimator::estimate_from_uniforms`].
    pub fn estimate(&self, marginals: &[MarginalModel]) -> Result<CopulaModel, CopulaError> {
        if marginals.is_empty() {
            return Err(CopulaError::InvalidInput(
                "at least one marginal model is required".to_string(),
            ));
        }
        let n_obs = marginals[0].residuals.len();
        if marginals.iter().any(|m| m.residuals.len() != n_obs) {
            return Err(CopulaError::InvalidInput(
                "marginal residual series are not aligned".to_string(),
            ));
        }

        let uniforms: Vec<Vec<f64>> = marginals
            .iter()
            .map(|m| {
                m.residuals
                    .iter()
                    .map(|&z| m.innovation_cdf(z).clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS))
                    .collect()
            })
            .collect();

        self.estimate_from_uniforms(&uniforms)
    }

    /// Estimates the copula directly from uniform observations,
    /// `uniforms[asset][time]`.
    ///
    /// # Errors
    /// - [`CopulaError::InvalidInput`] for misaligned series, values outside
    ///   (0, 1), or too few observations.
    /// - [`CopulaError::FitFailure`] when an archimedean parameter search
    ///   pins at an open domain boundary.
    /// - [`CopulaError::NumericalError`] for singular correlation estimates.
    pub fn estimate_from_uniforms(
        &self,
        uniforms: &[Vec<f64>],
    ) -> Result<CopulaModel, CopulaError> {
        validate_uniforms(uniforms)?;
        let n_assets = uniforms.len();

        match self.family {
            CopulaFamily::Gaussian => {
                let scores = normal_scores(uniforms);
                let (correlation, warnings) =
                    ensure_valid_correlation(score_correlation(&scores), self.options.projection)?;
                let (r_inv, ln_det) = correlation_inverse(&correlation)?;
                let log_likelihood = gaussian_copula_ll(&scores, &r_inv, ln_det);
                Ok(CopulaModel {
                    family: self.family,
                    params: CopulaParams::Gaussian { correlation },
                    log_likelihood,
                    n_assets,
                    warnings,
                })
            }
            CopulaFamily::StudentT => {
                let scores = normal_scores(uniforms);
                let (correlation, warnings) =
                    ensure_valid_correlation(score_correlation(&scores), self.options.projection)?;
                let (r_inv, ln_det) = correlation_inverse(&correlation)?;

                let (lo, hi) = self.options.dof_range;
                let steps = self.options.dof_steps.max(2);
                let mut best_dof = lo;
                let mut best_ll = f64::NEG_INFINITY;
                for k in 0..steps {
                    let dof = lo + (hi - lo) * k as f64 / (steps - 1) as f64;
                    let ll = t_copula_ll(uniforms, &r_inv, ln_det, dof)?;
                    if ll > best_ll {
                        best_ll = ll;
                        best_dof = dof;
                    }
                }

                Ok(CopulaModel {
                    family: self.family,
                    params: CopulaParams::StudentT {
                        correlation,
                        degrees_of_freedom: best_dof,
                    },
                    log_likelihood: best_ll,
                    n_assets,
                    warnings,
                })
            }
            CopulaFamily::Clayton => {
                let (theta, ll) = self.fit_archimedean(uniforms, clayton_pair_log_density)?;
                Ok(CopulaModel {
                    family: self.family,
                    params: CopulaParams::Clayton { theta },
                    log_likelihood: ll,
                    n_assets,
                    warnings: Vec::new(),
                })
            }
            CopulaFamily::Gumbel => {
                let (theta, ll) = self.fit_archimedean(uniforms, gumbel_pair_log_density)?;
                Ok(CopulaModel {
                    family: self.family,
                    params: CopulaParams::Gumbel { theta },
                    log_likelihood: ll,
                    n_assets,
                    warnings: Vec::new(),
                })
            }
        }
    }

    /// Pairwise-averaged bivariate grid MLE shared by the archimedean families.
    fn fit_archimedean(
        &self,
        uniforms: &[Vec<f64>],
        pair_log_density: fn(f64, f64, f64) -> f64,
    ) -> Result<(f64, f64), CopulaError> {
        if uniforms.len() < 2 {
            return Err(CopulaError::InvalidInput(
                "archimedean copulas require at least two assets".to_string(),
            ));
        }

        let (lo, hi) = match self.family {
            CopulaFamily::Clayton => self.options.clayton_range,
            CopulaFamily::Gumbel => self.options.gumbel_range,
            _ => unreachable!("archimedean fit called for elliptical family"),
        };
        let steps = self.options.theta_steps.max(2);
        // Log-spaced grid so resolution stays proportional across the range.
        let ratio = (hi / lo).ln() / (steps - 1) as f64;

        let mut best_idx = 0usize;
        let mut best_theta = lo;
        let mut best_ll = f64::NEG_INFINITY;
        for k in 0..steps {
            let theta = lo * (ratio * k as f64).exp();
            let ll = pairwise_average_ll(uniforms, theta, pair_log_density);
            if ll > best_ll {
                best_ll = ll;
                best_theta = theta;
                best_idx = k;
            }
        }

        // The Clayton domain is open at zero and both families are unbounded
        // above; an argmax pinned at either edge means no interior maximum.
        // Near the zero boundary the sample likelihood is flat to within
        // estimation noise, so the whole band below `CLAYTON_MIN_DEPENDENCE`
        // (Kendall tau under 0.05) counts as the boundary.
        let pinned_low = matches!(self.family, CopulaFamily::Clayton)
            && best_theta <= CLAYTON_MIN_DEPENDENCE;
        let pinned_high = best_idx == steps - 1;
        if pinned_low || pinned_high {
            return Err(CopulaError::FitFailure {
                family: self.family,
                last_best: best_theta,
                detail: if pinned_low {
                    "likelihood maximized at the zero-dependence boundary".to_string()
                } else {
                    "likelihood still increasing at the upper parameter bound".to_string()
                },
            });
        }

        Ok((best_theta, best_ll))
    }
}

/// Validates or repairs a correlation estimate.
///
/// A non-PSD matrix is replaced by its Higham nearest correlation matrix and
/// reported through a [`CopulaWarning::DegenerateCorrelation`]; the corrected
/// matrix is used, the warning attached, and estimation continues.
pub fn ensure_valid_correlation(
    correlation: Vec<Vec<f64>>,
    projection: PsdProjectionConfig,
) -> Result<(Vec<Vec<f64>>, Vec<CopulaWarning>), CopulaError> {
    let m = rows_to_matrix(&correlation);
    validate_correlation(&m).map_err(CopulaError::InvalidInput)?;

    if is_positive_semidefinite(&m, PSD_TOLERANCE) {
        return Ok((correlation, Vec::new()));
    }

    let min_eigenvalue = min_symmetric_eigenvalue(&m);
    let repaired = nearest_correlation(&m, projection).map_err(CopulaError::NumericalError)?;
    if !is_positive_semidefinite(&repaired, 1.0e-8) {
        return Err(CopulaError::NumericalError(
            "nearest-correlation projection did not produce a PSD matrix".to_string(),
        ));
    }

    Ok((
        matrix_to_rows(&repaired),
        vec![CopulaWarning::DegenerateCorrelation { min_eigenvalue }],
    ))
}

fn validate_uniforms(uniforms: &[Vec<f64>]) -> Result<(), CopulaError> {
    if uniforms.is_empty() {
        return Err(CopulaError::InvalidInput(
            "at least one uniform series is required".to_string(),
        ));
    }
    let n_obs = uniforms[0].len();
    if n_obs < MIN_OBSERVATIONS {
        return Err(CopulaError::InvalidInput(format!(
            "{n_obs} observations are too few for copula estimation (need {MIN_OBSERVATIONS})"
        )));
    }
    for series in uniforms {
        if series.len() != n_obs {
            return Err(CopulaError::InvalidInput(
                "uniform series are not aligned".to_string(),
            ));
        }
        if series.iter().any(|u| !u.is_finite() || *u <= 0.0 || *u >= 1.0) {
            return Err(CopulaError::InvalidInput(
                "uniform observations must lie strictly inside (0, 1)".to_string(),
            ));
        }
    }
    Ok(())
}

/// Maps uniforms to standard-normal scores, `scores[asset][time]`.
fn normal_scores(uniforms: &[Vec<f64>]) -> Vec<Vec<f64>> {
    uniforms
        .iter()
        .map(|series| series.iter().map(|&u| normal_inv_cdf(u)).collect())
        .collect()
}

/// Sample correlation of normal scores with clamped off-diagonals.
fn score_correlation(scores: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let d = scores.len();
    let n = scores[0].len() as f64;

    let mut corr = vec![vec![0.0; d]; d];
    let mut std = vec![0.0; d];
    for (i, series) in scores.iter().enumerate() {
        std[i] = (series.iter().map(|z| z * z).sum::<f64>() / n).sqrt().max(1.0e-12);
        corr[i][i] = 1.0;
    }
    for i in 0..d {
        for j in (i + 1)..d {
            let cov = scores[i]
                .iter()
                .zip(scores[j].iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n;
            let rho = (cov / (std[i] * std[j])).clamp(-MAX_OFF_DIAGONAL, MAX_OFF_DIAGONAL);
            corr[i][j] = rho;
            corr[j][i] = rho;
        }
    }
    corr
}

/// Inverse and log-determinant of a correlation matrix via Cholesky.
fn correlation_inverse(correlation: &[Vec<f64>]) -> Result<(DMatrix<f64>, f64), CopulaError> {
    let m = rows_to_matrix(correlation);
    let chol = m.cholesky().ok_or_else(|| {
        CopulaError::NumericalError("correlation matrix is numerically singular".to_string())
    })?;
    let ln_det = 2.0 * chol.l().diagonal().iter().map(|x| x.ln()).sum::<f64>();
    Ok((chol.inverse(), ln_det))
}

/// Gaussian copula log-likelihood over normal scores.
fn gaussian_copula_ll(scores: &[Vec<f64>], r_inv: &DMatrix<f64>, ln_det: f64) -> f64 {
    let d = scores.len();
    let n_obs = scores[0].len();

    let mut ll = 0.0;
    let mut z = vec![0.0; d];
    for t in 0..n_obs {
        for (i, series) in scores.iter().enumerate() {
            z[i] = series[t];
        }
        let mut quad = 0.0;
        for i in 0..d {
            for j in 0..d {
                quad += z[i] * r_inv[(i, j)] * z[j];
            }
            quad -= z[i] * z[i];
        }
        ll += -0.5 * ln_det - 0.5 * quad;
    }
    ll
}

/// Student-t copula log-likelihood at fixed correlation and dof.
fn t_copula_ll(
    uniforms: &[Vec<f64>],
    r_inv: &DMatrix<f64>,
    ln_det: f64,
    dof: f64,
) -> Result<f64, CopulaError> {
    let d = uniforms.len();
    let n_obs = uniforms[0].len();
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| CopulaError::NumericalError(e.to_string()))?;

    let d_f = d as f64;
    let constant = ln_gamma((dof + d_f) * 0.5) + (d_f - 1.0) * ln_gamma(dof * 0.5)
        - d_f * ln_gamma((dof + 1.0) * 0.5)
        - 0.5 * ln_det;

    let mut ll = 0.0;
    let mut q = vec![0.0; d];
    for t in 0..n_obs {
        for (i, series) in uniforms.iter().enumerate() {
            q[i] = dist.inverse_cdf(series[t]);
        }

        let mut quad = 0.0;
        let mut marginal_terms = 0.0;
        for i in 0..d {
            for j in 0..d {
                quad += q[i] * r_inv[(i, j)] * q[j];
            }
            marginal_terms += (1.0 + q[i] * q[i] / dof).ln();
        }

        ll += constant - 0.5 * (dof + d_f) * (1.0 + quad / dof).ln()
            + 0.5 * (dof + 1.0) * marginal_terms;
    }
    Ok(ll)
}

/// Mean bivariate log-likelihood over all asset pairs at parameter `theta`.
fn pairwise_average_ll(
    uniforms: &[Vec<f64>],
    theta: f64,
    pair_log_density: fn(f64, f64, f64) -> f64,
) -> f64 {
    let d = uniforms.len();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..d {
        for j in (i + 1)..d {
            let mut ll = 0.0;
            for (u, v) in uniforms[i].iter().zip(uniforms[j].iter()) {
                ll += pair_log_density(*u, *v, theta);
            }
            total += ll;
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Bivariate Clayton copula log-density, `theta > 0`.
fn clayton_pair_log_density(u: f64, v: f64, theta: f64) -> f64 {
    let s = u.powf(-theta) + v.powf(-theta) - 1.0;
    if !s.is_finite() || s <= 0.0 {
        return -1.0e12;
    }
    (1.0 + theta).ln() - (1.0 + theta) * (u.ln() + v.ln()) - (2.0 + 1.0 / theta) * s.ln()
}

/// Bivariate Gumbel copula log-density, `theta >= 1`.
fn gumbel_pair_log_density(u: f64, v: f64, theta: f64) -> f64 {
    let x = -u.ln();
    let y = -v.ln();
    let s = x.powf(theta) + y.powf(theta);
    if !s.is_finite() || s <= 0.0 {
        return -1.0e12;
    }
    let a = s.powf(1.0 / theta);

    -a + (theta - 1.0) * (x.ln() + y.ln()) - (u.ln() + v.ln()) + (1.0 / theta - 2.0) * s.ln()
        + (a + theta - 1.0).ln()
}

fn rows_to_matrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let n = rows.len();
    let data: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    DMatrix::from_row_slice(n, n, &data)
}

fn matrix_to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    use crate::math::normal_cdf;

    use super::*;

    fn independent_uniforms(n_assets: usize, n_obs: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n_assets)
            .map(|_| {
                (0..n_obs)
                    .map(|_| rng.random::<f64>().clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS))
                    .collect()
            })
            .collect()
    }

    fn correlated_gaussian_uniforms(rho: f64, n_obs: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut u1 = Vec::with_capacity(n_obs);
        let mut u2 = Vec::with_capacity(n_obs);
        let tail = (1.0 - rho * rho).sqrt();
        for _ in 0..n_obs {
            let z1: f64 = StandardNormal.sample(&mut rng);
            let z2: f64 = StandardNormal.sample(&mut rng);
            u1.push(normal_cdf(z1));
            u2.push(normal_cdf(rho * z1 + tail * z2));
        }
        vec![u1, u2]
    }

    #[test]
    fn gaussian_fit_on_independent_residuals_recovers_zero_correlation() {
        let uniforms = independent_uniforms(2, 4_000, 42);
        let model = CopulaEstimator::new(CopulaFamily::Gaussian)
            .estimate_from_uniforms(&uniforms)
            .unwrap();

        let CopulaParams::Gaussian { correlation } = &model.params else {
            panic!("expected gaussian parameters");
        };
        assert!(
            correlation[0][1].abs() < 0.05,
            "independent series should fit rho ~ 0, got {}",
            correlation[0][1]
        );
        assert!(model.warnings.is_empty());
    }

    #[test]
    fn gaussian_fit_recovers_positive_dependence() {
        let uniforms = correlated_gaussian_uniforms(0.6, 4_000, 7);
        let model = CopulaEstimator::new(CopulaFamily::Gaussian)
            .estimate_from_uniforms(&uniforms)
            .unwrap();

        let CopulaParams::Gaussian { correlation } = &model.params else {
            panic!("expected gaussian parameters");
        };
        assert!(
            (correlation[0][1] - 0.6).abs() < 0.05,
            "expected rho ~ 0.6, got {}",
            correlation[0][1]
        );
        assert!(model.log_likelihood > 0.0, "dependence should add likelihood");
    }

    #[test]
    fn student_t_fit_prefers_low_dof_for_tail_dependent_data() {
        // t(4) mixing: correlated normals over a shared chi-square shock.
        let mut rng = StdRng::seed_from_u64(5);
        let dof = 4.0;
        let dist = StudentsT::new(0.0, 1.0, dof).unwrap();
        let rho: f64 = 0.5;
        let tail = (1.0 - rho * rho).sqrt();
        let mut u1 = Vec::new();
        let mut u2 = Vec::new();
        for _ in 0..3_000 {
            let z1: f64 = StandardNormal.sample(&mut rng);
            let z2: f64 = StandardNormal.sample(&mut rng);
            let chi2: f64 = (0..4).map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                z * z
            }).sum();
            let scale = (chi2 / dof).max(1.0e-16).sqrt();
            u1.push(dist.cdf(z1 / scale).clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS));
            u2.push(
                dist.cdf((rho * z1 + tail * z2) / scale).clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS),
            );
        }

        let model = CopulaEstimator::new(CopulaFamily::StudentT)
            .estimate_from_uniforms(&[u1, u2])
            .unwrap();
        let CopulaParams::StudentT {
            degrees_of_freedom, ..
        } = model.params
        else {
            panic!("expected student-t parameters");
        };
        assert!(
            degrees_of_freedom < 15.0,
            "tail-dependent data should fit low dof, got {degrees_of_freedom}"
        );
    }

    #[test]
    fn clayton_fit_fails_on_independent_data() {
        let uniforms = independent_uniforms(2, 2_000, 9);
        let err = CopulaEstimator::new(CopulaFamily::Clayton)
            .estimate_from_uniforms(&uniforms)
            .expect_err("independence has no interior clayton maximum");
        assert!(matches!(err, CopulaError::FitFailure { .. }));
    }

    #[test]
    fn gumbel_fit_accepts_independence_at_theta_one() {
        let uniforms = independent_uniforms(2, 2_000, 11);
        let model = CopulaEstimator::new(CopulaFamily::Gumbel)
            .estimate_from_uniforms(&uniforms)
            .unwrap();
        let CopulaParams::Gumbel { theta } = model.params else {
            panic!("expected gumbel parameters");
        };
        assert!(theta < 1.1, "independent data should fit theta ~ 1, got {theta}");
    }

    #[test]
    fn degenerate_correlation_is_repaired_with_a_warning() {
        let non_psd = vec![
            vec![1.0, 0.95, 0.95],
            vec![0.95, 1.0, -0.95],
            vec![0.95, -0.95, 1.0],
        ];
        let (repaired, warnings) =
            ensure_valid_correlation(non_psd, PsdProjectionConfig::default()).unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            CopulaWarning::DegenerateCorrelation { min_eigenvalue } if min_eigenvalue < 0.0
        ));
        let m = rows_to_matrix(&repaired);
        assert!(is_positive_semidefinite(&m, 1.0e-8));
    }

    #[test]
    fn misaligned_uniform_series_are_rejected() {
        let err = CopulaEstimator::new(CopulaFamily::Gaussian)
            .estimate_from_uniforms(&[vec![0.5; 100], vec![0.5; 90]])
            .expect_err("misaligned series");
        assert!(matches!(err, CopulaError::InvalidInput(_)));
    }
}
