//! Box-constrained nonlinear least squares (Levenberg–Marquardt).
//!
//! We minimize `Σ r_i(p)^2` subject to `lower ≤ p ≤ upper` where the residual
//! vector comes from a user closure (typically an ODE solve followed by a
//! comparison against observations).
//!
//! Implementation choices:
//! - Jacobian by forward differences (backward at the upper bound). The
//!   residuals come out of an adaptive integrator, so the difference step is
//!   much larger than `sqrt(eps)` to stay above the integration noise.
//! - Marquardt scaling: the damping term is `λ·diag(JᵀJ)`.
//! - Bounds via an active set: a parameter sitting on a bound whose gradient
//!   points outward is frozen for the iteration, the free block is solved with
//!   Cholesky, and the trial point is projected back into the box.
//! - Determinism: no randomness, identical inputs give identical iterates.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::math::ode::OdeError;

/// Solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsqOptions {
    /// Outer iteration cap (one Jacobian evaluation per iteration).
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step ends the search.
    pub ftol: f64,
    /// Relative step length below which the search ends.
    pub xtol: f64,
    /// Cosine between residual and free Jacobian columns below which the
    /// search ends (MINPACK-style gradient test).
    pub gtol: f64,
    /// Relative finite-difference step for the Jacobian.
    pub diff_step: f64,
    /// Initial damping factor.
    pub initial_lambda: f64,
}

impl Default for LsqOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            diff_step: 1e-6,
            initial_lambda: 1e-3,
        }
    }
}

/// Per-parameter box constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    /// Same `[lower, upper]` interval for all `n` parameters.
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        Self {
            lower: vec![lower; n],
            upper: vec![upper; n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
            .collect()
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }
}

/// Why the optimizer stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Residuals vanished.
    ExactFit,
    /// Projected gradient test satisfied (includes "every parameter pinned at a bound").
    Gradient,
    /// Accepted step reduced the cost by less than `ftol` (relative).
    CostReduction,
    /// Step length fell below `xtol` (relative).
    StepSize,
}

#[derive(Debug, Clone)]
pub struct LsqSolution {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub sse: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Ways the optimizer can fail to produce a fit.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeError {
    #[error("model integration failed: {0}")]
    Integration(#[from] OdeError),
    #[error("initial guess has {got} parameters, bounds describe {expected}")]
    ParameterCount { expected: usize, got: usize },
    #[error("residuals are not finite at the starting point")]
    NonFiniteResidual,
    #[error("parameter {param} has no influence on the residuals")]
    Unidentifiable { param: usize },
    #[error("no convergence after {0} iterations")]
    MaxIterations(usize),
    #[error("damping grew without finding a better point")]
    Stalled,
}

const MAX_LAMBDA: f64 = 1e16;
const MIN_LAMBDA: f64 = 1e-12;
/// Jacobian columns with a smaller norm are treated as identically zero.
const ZERO_COLUMN: f64 = 1e-300;

/// Minimize `Σ r(p)_i^2` over the box `bounds`, starting from `x0`.
///
/// `residuals` may fail; a failure at the starting point or during a Jacobian
/// evaluation aborts the search, a failure at a trial point just rejects it.
pub fn least_squares<F>(
    mut residuals: F,
    x0: &[f64],
    bounds: &Bounds,
    opts: &LsqOptions,
) -> Result<LsqSolution, OptimizeError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, OptimizeError>,
{
    if x0.len() != bounds.len() {
        return Err(OptimizeError::ParameterCount {
            expected: bounds.len(),
            got: x0.len(),
        });
    }

    let p = x0.len();
    let mut x = bounds.clamp(x0);
    let mut r = residuals(&x)?;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(OptimizeError::NonFiniteResidual);
    }
    let mut sse = sum_sq(&r);
    let mut lambda = opts.initial_lambda;

    for iteration in 1..=opts.max_iterations {
        let jac = jacobian(&mut residuals, &x, &r, bounds, opts.diff_step)?;

        if iteration == 1 {
            for j in 0..p {
                if jac.column(j).norm() <= ZERO_COLUMN {
                    return Err(OptimizeError::Unidentifiable { param: j });
                }
            }
        }

        if sse == 0.0 {
            return Ok(solution(x, sse, iteration, Termination::ExactFit));
        }

        let rv = DVector::from_column_slice(&r);
        let grad = jac.transpose() * &rv;

        let free: Vec<usize> = (0..p)
            .filter(|&j| {
                let at_lower = x[j] <= bounds.lower[j] && grad[j] > 0.0;
                let at_upper = x[j] >= bounds.upper[j] && grad[j] < 0.0;
                !(at_lower || at_upper)
            })
            .collect();

        let r_norm = rv.norm();
        let gnorm = free
            .iter()
            .map(|&j| {
                let col = jac.column(j).norm();
                if col > 0.0 {
                    grad[j].abs() / (col * r_norm)
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        if free.is_empty() || gnorm <= opts.gtol {
            return Ok(solution(x, sse, iteration, Termination::Gradient));
        }

        let jf = jac.select_columns(free.iter());
        let jtj = jf.transpose() * &jf;
        let gf = DVector::from_iterator(free.len(), free.iter().map(|&j| grad[j]));

        loop {
            let mut a = jtj.clone();
            for i in 0..free.len() {
                a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }

            let Some(chol) = a.cholesky() else {
                lambda = bump(lambda)?;
                continue;
            };
            let delta = chol.solve(&(-&gf));

            let mut trial = x.clone();
            for (k, &j) in free.iter().enumerate() {
                trial[j] += delta[k];
            }
            let trial = bounds.clamp(&trial);

            let step_norm = trial
                .iter()
                .zip(&x)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                return Ok(solution(x, sse, iteration, Termination::StepSize));
            }

            let r_trial = match residuals(&trial) {
                Ok(rt) if rt.iter().all(|v| v.is_finite()) => rt,
                _ => {
                    lambda = bump(lambda)?;
                    continue;
                }
            };
            let sse_trial = sum_sq(&r_trial);

            if sse_trial < sse {
                let reduction = (sse - sse_trial) / sse;
                x = trial;
                r = r_trial;
                sse = sse_trial;
                lambda = (lambda / 10.0).max(MIN_LAMBDA);
                debug!(iteration, sse, lambda, "accepted step");

                if sse == 0.0 {
                    return Ok(solution(x, sse, iteration, Termination::ExactFit));
                }
                if reduction <= opts.ftol {
                    return Ok(solution(x, sse, iteration, Termination::CostReduction));
                }
                break;
            }

            lambda = bump(lambda)?;
        }
    }

    Err(OptimizeError::MaxIterations(opts.max_iterations))
}

fn bump(lambda: f64) -> Result<f64, OptimizeError> {
    let next = lambda * 10.0;
    if next > MAX_LAMBDA {
        Err(OptimizeError::Stalled)
    } else {
        Ok(next)
    }
}

fn solution(params: Vec<f64>, sse: f64, iterations: usize, termination: Termination) -> LsqSolution {
    debug!(iterations, sse, ?termination, "least squares finished");
    LsqSolution {
        params,
        sse,
        iterations,
        termination,
    }
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn jacobian<F>(
    residuals: &mut F,
    x: &[f64],
    r0: &[f64],
    bounds: &Bounds,
    diff_step: f64,
) -> Result<DMatrix<f64>, OptimizeError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, OptimizeError>,
{
    let n = r0.len();
    let p = x.len();
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut xp = x.to_vec();

    for j in 0..p {
        let mut h = diff_step * x[j].abs().max(1.0);
        if x[j] + h > bounds.upper[j] {
            h = -h;
        }
        xp[j] = x[j] + h;
        let rp = residuals(&xp)?;
        if rp.len() != n || rp.iter().any(|v| !v.is_finite()) {
            return Err(OptimizeError::NonFiniteResidual);
        }
        for i in 0..n {
            jac[(i, j)] = (rp[i] - r0[i]) / h;
        }
        xp[j] = x[j];
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp_model(ts: &[f64], ys: &[f64]) -> impl FnMut(&[f64]) -> Result<Vec<f64>, OptimizeError> {
        let ts = ts.to_vec();
        let ys = ys.to_vec();
        move |p: &[f64]| {
            Ok(ts
                .iter()
                .zip(&ys)
                .map(|(t, y)| p[0] * (-p[1] * t).exp() - y)
                .collect())
        }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let ts: Vec<f64> = (0..15).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = ts.iter().map(|t| 3.0 * (-0.7 * t).exp()).collect();
        let bounds = Bounds::uniform(2, 0.0, 10.0);

        let sol = least_squares(exp_model(&ts, &ys), &[1.0, 1.0], &bounds, &LsqOptions::default())
            .unwrap();
        assert!((sol.params[0] - 3.0).abs() < 1e-5, "{:?}", sol.params);
        assert!((sol.params[1] - 0.7).abs() < 1e-5, "{:?}", sol.params);
        assert!(sol.sse < 1e-10);
    }

    #[test]
    fn respects_upper_bound() {
        // True decay rate 0.7 lies outside the box; optimum sits on the bound.
        let ts: Vec<f64> = (0..15).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = ts.iter().map(|t| 3.0 * (-0.7 * t).exp()).collect();
        let bounds = Bounds {
            lower: vec![0.0, 0.0],
            upper: vec![10.0, 0.5],
        };

        let sol = least_squares(exp_model(&ts, &ys), &[1.0, 0.1], &bounds, &LsqOptions::default())
            .unwrap();
        assert!(bounds.contains(&sol.params));
        assert!((sol.params[1] - 0.5).abs() < 1e-9, "{:?}", sol.params);
    }

    #[test]
    fn flat_residuals_are_unidentifiable() {
        let bounds = Bounds::uniform(2, 0.0, 10.0);
        let err = least_squares(|_p: &[f64]| Ok(vec![0.0; 5]), &[0.3, 0.1], &bounds, &LsqOptions::default())
            .unwrap_err();
        assert_eq!(err, OptimizeError::Unidentifiable { param: 0 });
    }

    #[test]
    fn iteration_cap_is_an_error() {
        let ts: Vec<f64> = (0..15).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = ts.iter().map(|t| 3.0 * (-0.7 * t).exp()).collect();
        let bounds = Bounds::uniform(2, 0.0, 10.0);
        let opts = LsqOptions {
            max_iterations: 1,
            ..LsqOptions::default()
        };
        let err = least_squares(exp_model(&ts, &ys), &[9.0, 5.0], &bounds, &opts).unwrap_err();
        assert_eq!(err, OptimizeError::MaxIterations(1));
    }

    #[test]
    fn start_is_projected_into_the_box() {
        let bounds = Bounds::uniform(2, 0.0, 1.0);
        assert_eq!(bounds.clamp(&[-1.0, 2.0]), vec![0.0, 1.0]);
    }
}
