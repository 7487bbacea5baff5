//! Correlation-matrix validation and repair.
//!
//! References:
//! - Higham, N. (2002), *Computing the nearest correlation matrix*.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Configuration for nearest-PSD / nearest-correlation projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsdProjectionConfig {
    /// Convergence tolerance in Frobenius norm.
    pub tol: f64,
    /// Maximum number of Higham alternating-projection iterations.
    pub max_iterations: usize,
}

impl Default for PsdProjectionConfig {
    fn default() -> Self {
        Self {
            tol: 1.0e-10,
            max_iterations: 100,
        }
    }
}

/// Validates that `m` is a finite, symmetric correlation matrix with unit
/// diagonal and entries in `[-1, 1]`.
pub fn validate_correlation(m: &DMatrix<f64>) -> Result<(), String> {
    let n = m.nrows();
    if n == 0 || m.ncols() != n {
        return Err("correlation matrix must be square and non-empty".to_string());
    }

    for i in 0..n {
        let di = m[(i, i)];
        if !di.is_finite() || (di - 1.0).abs() > 1.0e-10 {
            return Err("correlation matrix diagonal must be 1".to_string());
        }
        for j in 0..n {
            let rho = m[(i, j)];
            if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                return Err("correlation entries must be finite and in [-1, 1]".to_string());
            }
            if (rho - m[(j, i)]).abs() > 1.0e-10 {
                return Err("correlation matrix must be symmetric".to_string());
            }
        }
    }

    Ok(())
}

/// Minimum eigenvalue of a symmetric matrix.
pub fn min_symmetric_eigenvalue(m: &DMatrix<f64>) -> f64 {
    let eig = SymmetricEigen::new(symmetrize(m));
    eig.eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Returns `true` when `m` is positive semidefinite within tolerance `tol`.
pub fn is_positive_semidefinite(m: &DMatrix<f64>, tol: f64) -> bool {
    min_symmetric_eigenvalue(m) >= -tol
}

/// Nearest correlation matrix by Higham (2002) alternating projections.
///
/// Alternates a PSD projection with a unit-diagonal projection, then clips
/// off-diagonal entries into `[-1, 1]` and re-symmetrizes.
pub fn nearest_correlation(
    m: &DMatrix<f64>,
    cfg: PsdProjectionConfig,
) -> Result<DMatrix<f64>, String> {
    let n = m.nrows();
    if n == 0 || m.ncols() != n {
        return Err("matrix must be square and non-empty".to_string());
    }
    if m.iter().any(|x| !x.is_finite() || x.abs() > 1.0e6) {
        return Err("matrix entries must be finite and reasonably bounded".to_string());
    }

    let mut y = symmetrize(m);
    for i in 0..n {
        y[(i, i)] = 1.0;
    }

    let mut delta_s = DMatrix::<f64>::zeros(n, n);

    for _ in 0..cfg.max_iterations {
        let r = symmetrize(&(&y - &delta_s));
        let x = project_psd(&r);
        delta_s = &x - &r;

        let mut y_next = x;
        for i in 0..n {
            y_next[(i, i)] = 1.0;
        }
        y_next = symmetrize(&y_next);

        let diff = (&y_next - &y).norm();
        y = y_next;
        if diff < cfg.tol {
            break;
        }
    }

    // Final cleanup pass: PSD projection and exact unit diagonal.
    y = project_psd(&symmetrize(&y));
    for i in 0..n {
        y[(i, i)] = 1.0;
        for j in (i + 1)..n {
            let clipped = y[(i, j)].clamp(-1.0, 1.0);
            y[(i, j)] = clipped;
            y[(j, i)] = clipped;
        }
    }

    Ok(y)
}

/// Cholesky factor for symmetric positive semidefinite matrices.
///
/// Returns lower-triangular `L` with `L L^T ~= m`, or `None` when `m` is
/// indefinite beyond `tol`.
pub fn cholesky_lower_psd(m: &DMatrix<f64>, tol: f64) -> Option<DMatrix<f64>> {
    let n = m.nrows();
    if n == 0 || m.ncols() != n {
        return None;
    }

    let mut l = DMatrix::<f64>::zeros(n, n);

    for i in 0..n {
        for j in 0..=i {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }

            if i == j {
                if sum < -tol {
                    return None;
                }
                l[(i, j)] = sum.max(tol).sqrt();
            } else if l[(j, j)] > tol {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }

    Some(l)
}

fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

fn project_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(symmetrize(m));
    let vals = eig
        .eigenvalues
        .iter()
        .map(|v| v.max(0.0))
        .collect::<Vec<_>>();
    let d = DMatrix::from_diagonal(&DVector::from_vec(vals));
    symmetrize(&(&eig.eigenvectors * d * eig.eigenvectors.transpose()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_repairs_non_psd_matrix() {
        let bad = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 0.95, 0.95, 0.95, 1.0, -0.95, 0.95, -0.95, 1.0],
        );

        assert!(validate_correlation(&bad).is_ok());
        assert!(!is_positive_semidefinite(&bad, 1.0e-12));

        let repaired =
            nearest_correlation(&bad, PsdProjectionConfig::default()).expect("repair succeeds");

        validate_correlation(&repaired).expect("repaired matrix stays valid");
        assert!(is_positive_semidefinite(&repaired, 1.0e-8));
    }

    #[test]
    fn cholesky_reconstructs_psd_input() {
        let corr =
            DMatrix::from_row_slice(3, 3, &[1.0, 0.4, 0.2, 0.4, 1.0, -0.3, 0.2, -0.3, 1.0]);
        let l = cholesky_lower_psd(&corr, 1.0e-12).expect("valid cholesky");
        let rebuilt = &l * l.transpose();
        assert!((&rebuilt - &corr).norm() < 1.0e-9);
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let bad = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(cholesky_lower_psd(&bad, 1.0e-12).is_none());
    }
}
