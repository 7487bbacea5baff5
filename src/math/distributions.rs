//! Standardized innovation distributions for GARCH residuals.
//!
//! All densities here are parameterized to have zero mean and unit variance so
//! they can be applied directly to standardized residuals `z_t = eps_t / sigma_t`.
//! The skewed Student-t follows Hansen's (1994) standardized parameterization
//! with skewness `lambda in (-1, 1)` and degrees of freedom `nu > 2`.

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::gamma::ln_gamma;

const MIN_DENSITY_LOG: f64 = -1.0e12;
const MIN_STD: f64 = 1.0e-12;

/// Shape fit for a unit-variance Student-t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudentTShape {
    pub degrees_of_freedom: f64,
    pub log_likelihood: f64,
}

/// Shape fit for a unit-variance Hansen skewed Student-t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewTShape {
    pub degrees_of_freedom: f64,
    pub skew_lambda: f64,
    pub log_likelihood: f64,
}

fn students_t(nu: f64) -> StudentsT {
    StudentsT::new(0.0, 1.0, nu).expect("degrees of freedom are validated > 2")
}

/// Log-density of a unit-variance Student-t at `z`.
///
/// Requires `nu > 2` so the variance rescaling is defined.
pub fn student_t_std_log_pdf(z: f64, nu: f64) -> f64 {
    debug_assert!(nu > 2.0, "student-t requires nu > 2");
    let s = (nu / (nu - 2.0)).sqrt();
    let x = z * s;
    let ll = ln_gamma((nu + 1.0) * 0.5) - ln_gamma(nu * 0.5)
        - 0.5 * (nu * PI).ln()
        - 0.5 * (nu + 1.0) * (1.0 + x * x / nu).ln();
    ll + s.ln()
}

/// CDF of a unit-variance Student-t at `z`.
pub fn student_t_std_cdf(z: f64, nu: f64) -> f64 {
    debug_assert!(nu > 2.0, "student-t requires nu > 2");
    students_t(nu).cdf(z * (nu / (nu - 2.0)).sqrt())
}

/// Quantile of a unit-variance Student-t.
pub fn student_t_std_quantile(u: f64, nu: f64) -> f64 {
    debug_assert!(nu > 2.0, "student-t requires nu > 2");
    students_t(nu).inverse_cdf(u) * ((nu - 2.0) / nu).sqrt()
}

/// Hansen constants `(a, b, c)` for skewness `lambda` and dof `nu`.
///
/// Returns `None` when the implied `b^2` is numerically non-positive.
fn hansen_constants(nu: f64, lambda: f64) -> Option<(f64, f64, f64)> {
    let c = (ln_gamma((nu + 1.0) * 0.5) - ln_gamma(nu * 0.5)).exp() / (PI * (nu - 2.0)).sqrt();
    let a = 4.0 * lambda * c * ((nu - 2.0) / (nu - 1.0));
    let b_sq = 1.0 + 3.0 * lambda * lambda - a * a;
    if b_sq <= MIN_STD {
        None
    } else {
        Some((a, b_sq.sqrt(), c))
    }
}

/// Log-density of Hansen's standardized skewed Student-t at `z`.
pub fn skew_t_log_pdf(z: f64, nu: f64, lambda: f64) -> f64 {
    debug_assert!(nu > 2.0 && lambda.abs() < 1.0, "invalid skew-t shape");
    let Some((a, b, c)) = hansen_constants(nu, lambda) else {
        return MIN_DENSITY_LOG;
    };

    let denom = if z < -a / b { 1.0 - lambda } else { 1.0 + lambda };
    if denom <= MIN_STD {
        return MIN_DENSITY_LOG;
    }

    let x = (b * z + a) / denom;
    let core = 1.0 + x * x / (nu - 2.0);
    if core <= 0.0 {
        return MIN_DENSITY_LOG;
    }

    (b * c).ln() - 0.5 * (nu + 1.0) * core.ln()
}

/// CDF of Hansen's standardized skewed Student-t at `z`.
pub fn skew_t_cdf(z: f64, nu: f64, lambda: f64) -> f64 {
    debug_assert!(nu > 2.0 && lambda.abs() < 1.0, "invalid skew-t shape");
    let Some((a, b, _)) = hansen_constants(nu, lambda) else {
        return f64::NAN;
    };

    let t = students_t(nu);
    let scale = (nu / (nu - 2.0)).sqrt();
    if z < -a / b {
        (1.0 - lambda) * t.cdf(scale * (b * z + a) / (1.0 - lambda))
    } else {
        0.5 * (1.0 - lambda) + (1.0 + lambda) * (t.cdf(scale * (b * z + a) / (1.0 + lambda)) - 0.5)
    }
}

/// Quantile of Hansen's standardized skewed Student-t.
pub fn skew_t_quantile(u: f64, nu: f64, lambda: f64) -> f64 {
    debug_assert!(nu > 2.0 && lambda.abs() < 1.0, "invalid skew-t shape");
    let Some((a, b, _)) = hansen_constants(nu, lambda) else {
        return f64::NAN;
    };

    let t = students_t(nu);
    let scale = ((nu - 2.0) / nu).sqrt();
    let split = 0.5 * (1.0 - lambda);
    if u < split {
        ((1.0 - lambda) * scale * t.inverse_cdf(u / (1.0 - lambda)) - a) / b
    } else {
        let inner = 0.5 + (u - split) / (1.0 + lambda);
        ((1.0 + lambda) * scale * t.inverse_cdf(inner) - a) / b
    }
}

/// Fits the Student-t shape to standardized residuals by grid-search MLE
/// over `nu in (2, 200]`.
pub fn fit_student_t_shape(residuals: &[f64]) -> StudentTShape {
    let mut best_nu = 8.0;
    let mut best_ll = f64::NEG_INFINITY;

    for step in 0..500 {
        let nu = 2.05 + step as f64 * (197.95 / 499.0);
        let ll: f64 = residuals
            .iter()
            .map(|&z| student_t_std_log_pdf(z, nu))
            .sum();
        if ll > best_ll {
            best_ll = ll;
            best_nu = nu;
        }
    }

    StudentTShape {
        degrees_of_freedom: best_nu,
        log_likelihood: best_ll,
    }
}

/// Fits the Hansen skew-t shape to standardized residuals by grid-search MLE
/// over `nu in (2, 80]` and `lambda in [-0.9, 0.9]`.
pub fn fit_skew_t_shape(residuals: &[f64]) -> SkewTShape {
    let mut best_nu = 8.0;
    let mut best_lambda = 0.0;
    let mut best_ll = f64::NEG_INFINITY;

    for nu_step in 0..140 {
        let nu = 2.05 + nu_step as f64 * (77.95 / 139.0);
        for l_step in 0..61 {
            let lambda = -0.9 + l_step as f64 * (1.8 / 60.0);
            let ll: f64 = residuals
                .iter()
                .map(|&z| skew_t_log_pdf(z, nu, lambda))
                .sum();
            if ll > best_ll {
                best_ll = ll;
                best_nu = nu;
                best_lambda = lambda;
            }
        }
    }

    SkewTShape {
        degrees_of_freedom: best_nu,
        skew_lambda: best_lambda,
        log_likelihood: best_ll,
    }
}
