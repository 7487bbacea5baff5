//! Bounded direct-search optimization for likelihood maximization.
//!
//! References:
//! - Nelder and Mead (1965), simplex direct search.
//! - Nocedal and Wright, *Numerical Optimization* (2nd ed.), Ch. 9.

use serde::{Deserialize, Serialize};

/// Box constraints `lower <= x <= upper` for every optimizer parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoxConstraints {
    /// Builds validated constraints.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, String> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err("constraints require same non-zero lower/upper dimensions".to_string());
        }
        for i in 0..lower.len() {
            if !lower[i].is_finite() || !upper[i].is_finite() || lower[i] > upper[i] {
                return Err(format!(
                    "invalid bound at index {i}: [{}, {}]",
                    lower[i], upper[i]
                ));
            }
        }
        Ok(Self { lower, upper })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Clamps a point into the box.
    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| v.clamp(self.lower[i], self.upper[i]))
            .collect()
    }
}

/// Optimizer termination reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    ObjectiveTolerance,
    MaxIterations,
    NumericalFailure,
}

/// Convergence metadata attached to every fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    pub iterations: usize,
    pub objective_evaluations: usize,
    pub converged: bool,
    pub reason: TerminationReason,
}

/// Nelder-Mead tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    /// Initial simplex step as a fraction of each parameter's box width.
    pub initial_step: f64,
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
    /// Stop when both objective spread and simplex diameter fall below this.
    pub tolerance: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            initial_step: 0.08,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
            tolerance: 1.0e-8,
        }
    }
}

/// Result of a bounded minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeResult {
    pub x: Vec<f64>,
    pub objective: f64,
    pub convergence: ConvergenceInfo,
}

/// Minimizes `objective_fn` over the box with a bounded Nelder-Mead simplex.
///
/// Every candidate point is clamped into the box before evaluation. Stops on
/// the combined spread/diameter tolerance or at the iteration cap; a
/// non-finite objective at the start point is a hard error.
pub fn nelder_mead<F>(
    initial: &[f64],
    bounds: &BoxConstraints,
    options: NelderMeadOptions,
    mut objective_fn: F,
) -> Result<MinimizeResult, String>
where
    F: FnMut(&[f64]) -> f64,
{
    let dim = bounds.dimension();
    if initial.len() != dim {
        return Err("initial vector dimension does not match bounds".to_string());
    }

    let mut evals = 0usize;
    let x0 = bounds.clamp(initial);
    let f0 = objective_fn(&x0);
    evals += 1;
    if !f0.is_finite() {
        return Err("objective is not finite at the initial point".to_string());
    }

    let mut simplex = Vec::with_capacity(dim + 1);
    let mut values = Vec::with_capacity(dim + 1);
    simplex.push(x0.clone());
    values.push(f0);

    for d in 0..dim {
        let mut x = x0.clone();
        let step = (bounds.upper[d] - bounds.lower[d]).abs() * options.initial_step.max(1.0e-4);
        x[d] = (x[d] + step).min(bounds.upper[d]);
        if (x[d] - x0[d]).abs() < 1.0e-14 {
            x[d] = (x[d] - step).max(bounds.lower[d]);
        }
        let x = bounds.clamp(&x);
        values.push(objective_fn(&x));
        evals += 1;
        simplex.push(x);
    }

    let mut iterations = 0usize;
    let mut reason = TerminationReason::MaxIterations;
    let mut converged = false;

    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if values.iter().any(|v| !v.is_finite()) {
            reason = TerminationReason::NumericalFailure;
            break;
        }

        let spread = (values[dim] - values[0]).abs();
        let centroid: Vec<f64> = (0..dim)
            .map(|d| simplex.iter().take(dim).map(|x| x[d]).sum::<f64>() / dim as f64)
            .collect();
        let diameter = simplex
            .iter()
            .map(|x| {
                x.iter()
                    .zip(centroid.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0_f64, f64::max);

        if spread <= options.tolerance && diameter <= options.tolerance {
            converged = true;
            reason = TerminationReason::ObjectiveTolerance;
            break;
        }

        // Reflection.
        let xr: Vec<f64> = (0..dim)
            .map(|d| centroid[d] + options.reflection * (centroid[d] - simplex[dim][d]))
            .collect();
        let xr = bounds.clamp(&xr);
        let fr = objective_fn(&xr);
        evals += 1;

        if fr < values[0] {
            // Expansion.
            let xe: Vec<f64> = (0..dim)
                .map(|d| centroid[d] + options.expansion * (xr[d] - centroid[d]))
                .collect();
            let xe = bounds.clamp(&xe);
            let fe = objective_fn(&xe);
            evals += 1;

            if fe < fr {
                simplex[dim] = xe;
                values[dim] = fe;
            } else {
                simplex[dim] = xr;
                values[dim] = fr;
            }
            continue;
        }

        if fr < values[dim - 1] {
            simplex[dim] = xr;
            values[dim] = fr;
            continue;
        }

        // Contraction.
        let xc: Vec<f64> = (0..dim)
            .map(|d| centroid[d] + options.contraction * (simplex[dim][d] - centroid[d]))
            .collect();
        let xc = bounds.clamp(&xc);
        let fc = objective_fn(&xc);
        evals += 1;

        if fc < values[dim] {
            simplex[dim] = xc;
            values[dim] = fc;
            continue;
        }

        // Shrink toward the best vertex.
        for i in 1..=dim {
            for d in 0..dim {
                simplex[i][d] = simplex[0][d] + options.shrink * (simplex[i][d] - simplex[0][d]);
            }
            simplex[i] = bounds.clamp(&simplex[i]);
            values[i] = objective_fn(&simplex[i]);
            evals += 1;
        }
    }

    let mut order: Vec<usize> = (0..simplex.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    Ok(MinimizeResult {
        x: simplex[order[0]].clone(),
        objective: values[order[0]],
        convergence: ConvergenceInfo {
            iterations,
            objective_evaluations: evals,
            converged,
            reason,
        },
    })
}
