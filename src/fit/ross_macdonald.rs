//! Ross–Macdonald fitter: estimates `(a, b, c, μv)` against the `Ih` compartment.
//!
//! With million-scale populations any biting rate of order one infects the
//! whole human population within the first day, and the cost surface around
//! such a guess is flat. The fit therefore also starts from a point where the
//! initial human incidence balances recovery of the first observation.

use crate::domain::{FitResult, FitSettings, ModelKind};
use crate::fit::fitter::{FitError, FitProblem, fit_model};
use crate::math::Bounds;
use crate::models::{HUMAN_RECOVERY_RATE, RmParams, RmPopulation, RossMacdonald};

/// Fit `(a, b, c, μv)` within `[0, 2]⁴` starting from `guess`.
pub fn fit_rm(
    times: &[f64],
    observed: &[f64],
    population: &RmPopulation,
    guess: RmParams,
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    let ih0 = observed.first().copied().ok_or(FitError::EmptySeries)?;
    let (lower, upper) = RmParams::BOUNDS;

    let problem = FitProblem {
        model: ModelKind::RossMacdonald,
        times,
        observed,
        y0: RossMacdonald::initial_state(ih0, population).to_vec(),
        guess: guess.to_vec(),
        alternatives: balanced_start(ih0, population, guess)
            .map(|p| vec![p.to_vec()])
            .unwrap_or_default(),
        bounds: Bounds::uniform(4, lower, upper),
        fallback: RmParams::FALLBACK.to_vec(),
    };
    fit_model(&problem, settings)
}

/// `guess` with `a = b` chosen so that `a·b·Sh0·Iv0 = r·max(ih0, 1)`.
///
/// `None` when there is nobody to infect or no infected mosquito.
pub fn balanced_start(ih0: f64, population: &RmPopulation, guess: RmParams) -> Option<RmParams> {
    let sh0 = population.n_h - ih0;
    let ab = HUMAN_RECOVERY_RATE * ih0.max(1.0) / (sh0 * population.iv0);
    if !(ab.is_finite() && ab > 0.0) {
        return None;
    }
    let (lower, upper) = RmParams::BOUNDS;
    let rate = ab.sqrt().clamp(lower, upper);
    Some(RmParams {
        a: rate,
        b: rate,
        ..guess
    })
}
