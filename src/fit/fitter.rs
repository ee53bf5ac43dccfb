//! Generic least-squares fitting of an epidemic model to observed cases.
//!
//! Given:
//! - sample times `t_i` and observed counts `y_i`
//! - an initial state `y0`
//! - a starting guess, box bounds and fallback parameters
//!
//! we:
//! - minimize `Σ (x_k(t_i; p) − y_i)^2` over `p` where `x_k` is the observed
//!   compartment of the integrated model, from the guess and from any
//!   alternative starts, keeping the lowest cost
//! - substitute the fallback parameters if the optimizer fails for any reason
//! - integrate once more with the chosen parameters and report the RMSE

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{FitOutcome, FitResult, FitSettings, ModelKind, Trajectory};
use crate::math::{Bounds, OptimizeError, integrate, least_squares};
use crate::models::ModelSystem;

/// Input problems that make a fit impossible to even attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("cannot fit an empty series")]
    EmptySeries,
    #[error("{times} sample times but {observed} observations")]
    LengthMismatch { times: usize, observed: usize },
}

/// One fitting problem for a given model kind.
#[derive(Debug, Clone)]
pub struct FitProblem<'a> {
    pub model: ModelKind,
    pub times: &'a [f64],
    pub observed: &'a [f64],
    pub y0: Vec<f64>,
    pub guess: Vec<f64>,
    /// Further starting points, tried after `guess`.
    pub alternatives: Vec<Vec<f64>>,
    pub bounds: Bounds,
    pub fallback: Vec<f64>,
}

/// Fit `problem.model` and return its trajectory, RMSE and outcome.
///
/// Optimizer failures never surface as errors: they turn into
/// `FitOutcome::FallbackUsed` carrying the reason.
pub fn fit_model(problem: &FitProblem<'_>, settings: &FitSettings) -> Result<FitResult, FitError> {
    if problem.times.len() != problem.observed.len() {
        return Err(FitError::LengthMismatch {
            times: problem.times.len(),
            observed: problem.observed.len(),
        });
    }
    if problem.observed.is_empty() {
        return Err(FitError::EmptySeries);
    }

    let component = problem.model.observed_component();
    let residuals = |params: &[f64]| -> Result<Vec<f64>, OptimizeError> {
        let system = ModelSystem::new(problem.model, params).map_err(|_| {
            OptimizeError::ParameterCount {
                expected: problem.model.param_names().len(),
                got: params.len(),
            }
        })?;
        let states = integrate(&system, &problem.y0, problem.times, &settings.ode)?;
        Ok(states
            .iter()
            .zip(problem.observed)
            .map(|(state, obs)| state[component] - obs)
            .collect())
    };

    let mut result = least_squares(&residuals, &problem.guess, &problem.bounds, &settings.lsq);
    for (start, alt) in problem.alternatives.iter().enumerate() {
        match least_squares(&residuals, alt, &problem.bounds, &settings.lsq) {
            Ok(solution) => {
                debug!(
                    model = problem.model.display_name(),
                    start,
                    sse = solution.sse,
                    "alternative start converged"
                );
                result = match result {
                    Ok(best) if best.sse <= solution.sse => Ok(best),
                    _ => Ok(solution),
                };
            }
            Err(reason) => {
                debug!(model = problem.model.display_name(), start, %reason, "alternative start failed");
            }
        }
    }

    let outcome = match result {
        Ok(solution) => {
            debug!(
                model = problem.model.display_name(),
                params = ?solution.params,
                sse = solution.sse,
                iterations = solution.iterations,
                termination = ?solution.termination,
                "optimizer converged"
            );
            FitOutcome::Converged {
                params: solution.params,
                iterations: solution.iterations,
            }
        }
        Err(reason) => {
            warn!(
                model = problem.model.display_name(),
                %reason,
                fallback = ?problem.fallback,
                "optimizer failed, using default parameters"
            );
            FitOutcome::FallbackUsed {
                params: problem.fallback.clone(),
                reason,
            }
        }
    };

    let trajectory = final_trajectory(problem, outcome.params(), settings);
    let rmse = rmse(&trajectory.component(component), problem.observed);

    Ok(FitResult {
        model: problem.model,
        trajectory,
        rmse,
        outcome,
    })
}

/// Integrate with the chosen parameters. A failure here leaves NaN states so
/// the RMSE reports the fit as unusable instead of aborting the pipeline.
fn final_trajectory(problem: &FitProblem<'_>, params: &[f64], settings: &FitSettings) -> Trajectory {
    let states = ModelSystem::new(problem.model, params)
        .ok()
        .and_then(|system| match integrate(&system, &problem.y0, problem.times, &settings.ode) {
            Ok(states) => Some(states),
            Err(err) => {
                warn!(model = problem.model.display_name(), %err, "final integration failed");
                None
            }
        })
        .unwrap_or_else(|| vec![vec![f64::NAN; problem.y0.len()]; problem.times.len()]);

    Trajectory {
        times: problem.times.to_vec(),
        states,
    }
}

/// Root-mean-square error between two equally long series.
pub fn rmse(predicted: &[f64], observed: &[f64]) -> f64 {
    let n = predicted.len().min(observed.len());
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = predicted
        .iter()
        .zip(observed)
        .map(|(p, o)| (p - o).powi(2))
        .sum();
    (sse / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_zero_iff_exact() {
        assert_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
        let r = rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]);
        assert!((r - (4.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let problem = FitProblem {
            model: ModelKind::Sir,
            times: &[0.0, 1.0],
            observed: &[0.1],
            y0: vec![0.9, 0.1, 0.0],
            guess: vec![0.3, 0.1],
            alternatives: Vec::new(),
            bounds: Bounds::uniform(2, 0.0, 10.0),
            fallback: vec![0.3, 0.1],
        };
        let err = fit_model(&problem, &FitSettings::default()).unwrap_err();
        assert_eq!(
            err,
            FitError::LengthMismatch {
                times: 2,
                observed: 1
            }
        );
    }

    #[test]
    fn bad_guess_length_falls_back() {
        let problem = FitProblem {
            model: ModelKind::Sir,
            times: &[0.0, 1.0, 2.0],
            observed: &[0.1, 0.12, 0.15],
            y0: vec![0.9, 0.1, 0.0],
            guess: vec![0.3],
            alternatives: Vec::new(),
            bounds: Bounds::uniform(2, 0.0, 10.0),
            fallback: vec![0.3, 0.1],
        };
        let fit = fit_model(&problem, &FitSettings::default()).unwrap();
        assert!(fit.outcome.is_fallback());
        assert_eq!(fit.params(), &[0.3, 0.1]);
        assert_eq!(fit.trajectory.len(), 3);
        assert!(fit.rmse.is_finite());
    }

    #[test]
    fn alternative_start_rescues_a_failed_guess() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y0 = vec![0.9, 0.1, 0.0];
        let system = ModelSystem::new(ModelKind::Sir, &[0.5, 0.1]).unwrap();
        let observed: Vec<f64> = integrate(&system, &y0, &times, &FitSettings::default().ode)
            .unwrap()
            .iter()
            .map(|s| s[1])
            .collect();

        let problem = FitProblem {
            model: ModelKind::Sir,
            times: &times,
            observed: &observed,
            y0,
            guess: vec![0.3],
            alternatives: vec![vec![0.5, 0.1]],
            bounds: Bounds::uniform(2, 0.0, 10.0),
            fallback: vec![0.3, 0.1],
        };
        let fit = fit_model(&problem, &FitSettings::default()).unwrap();
        assert!(!fit.outcome.is_fallback());
        assert_eq!(fit.params(), &[0.5, 0.1]);
        assert_eq!(fit.rmse, 0.0);
    }
}
