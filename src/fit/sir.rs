//! SIR fitter: estimates `(β, γ)` against the `I` compartment.

use crate::domain::{FitResult, FitSettings, ModelKind};
use crate::fit::fitter::{FitError, FitProblem, fit_model};
use crate::math::Bounds;
use crate::models::{Sir, SirParams};

/// Fit `(β, γ)` within `[0, 10]²` starting from `guess`.
///
/// The initial state is `(1 − I[0], I[0], 0)`; see the `models::sir` docs for
/// the population scaling caveat.
pub fn fit_sir(
    times: &[f64],
    observed: &[f64],
    guess: SirParams,
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    let i0 = observed.first().copied().ok_or(FitError::EmptySeries)?;
    let (lower, upper) = SirParams::BOUNDS;

    let problem = FitProblem {
        model: ModelKind::Sir,
        times,
        observed,
        y0: Sir::initial_state(i0).to_vec(),
        guess: guess.to_vec(),
        alternatives: Vec::new(),
        bounds: Bounds::uniform(2, lower, upper),
        fallback: SirParams::FALLBACK.to_vec(),
    };
    fit_model(&problem, settings)
}
