//! Reporting utilities: fit interpretation and formatted terminal output.

mod format;

pub use format::*;

use crate::domain::{FitResult, ModelKind, ResultBundle};
use crate::forecast::{Trend, recent_trend};
use crate::models::{RmParams, SirParams};

/// Derived, human-facing reading of one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub model: ModelKind,
    pub rmse: f64,
    pub fallback: bool,
    /// `(name, value)` in `model.param_names()` order.
    pub params: Vec<(&'static str, f64)>,
    /// Last value of the observed compartment.
    pub last_fitted: Option<f64>,
    pub recent_trend: Option<Trend>,
    /// `1/γ` in days (SIR only).
    pub infectious_period: Option<f64>,
    /// `1/μv` in days (Ross–Macdonald only).
    pub mosquito_lifespan: Option<f64>,
}

pub fn summarize_fit(fit: &FitResult) -> FitSummary {
    let params = fit.params();
    let fitted = fit.fitted();

    let (infectious_period, mosquito_lifespan) = match (fit.model, params) {
        (ModelKind::Sir, &[beta, gamma]) => (SirParams { beta, gamma }.infectious_period(), None),
        (ModelKind::RossMacdonald, &[a, b, c, mu_v]) => {
            (None, RmParams { a, b, c, mu_v }.mosquito_lifespan())
        }
        _ => (None, None),
    };

    FitSummary {
        model: fit.model,
        rmse: fit.rmse,
        fallback: fit.outcome.is_fallback(),
        params: fit
            .model
            .param_names()
            .iter()
            .copied()
            .zip(params.iter().copied())
            .collect(),
        last_fitted: fitted.last().copied(),
        recent_trend: recent_trend(&fitted),
        infectious_period,
        mosquito_lifespan,
    }
}

/// The fit with the lowest finite RMSE, if any.
pub fn best_fit(bundle: &ResultBundle) -> Option<&FitResult> {
    bundle
        .fits()
        .filter(|f| f.rmse.is_finite())
        .min_by(|a, b| a.rmse.total_cmp(&b.rmse))
}

/// One-line meaning of each fitted coefficient.
pub fn param_description(name: &str) -> &'static str {
    match name {
        "beta" => "transmission rate",
        "gamma" => "recovery rate",
        "a" => "mosquito bites per day",
        "b" => "human infection probability per bite",
        "c" => "mosquito infection probability per bite",
        "mu_v" => "mosquito death rate",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitOutcome, ObservationSeries, Trajectory};
    use crate::math::OptimizeError;

    fn fit(model: ModelKind, params: Vec<f64>, observed: &[f64], rmse: f64) -> FitResult {
        let dim = model.compartment_names().len();
        let states = observed
            .iter()
            .map(|&v| {
                let mut s = vec![0.0; dim];
                s[model.observed_component()] = v;
                s
            })
            .collect();
        FitResult {
            model,
            trajectory: Trajectory {
                times: (0..observed.len()).map(|i| i as f64).collect(),
                states,
            },
            rmse,
            outcome: FitOutcome::Converged {
                params,
                iterations: 5,
            },
        }
    }

    #[test]
    fn sir_summary_reads_infectious_period() {
        let f = fit(ModelKind::Sir, vec![0.5, 0.25], &[1.0, 2.0, 3.0, 4.0, 5.0], 0.3);
        let s = summarize_fit(&f);
        assert_eq!(s.params, vec![("beta", 0.5), ("gamma", 0.25)]);
        assert_eq!(s.infectious_period, Some(4.0));
        assert_eq!(s.mosquito_lifespan, None);
        assert_eq!(s.last_fitted, Some(5.0));
        assert_eq!(s.recent_trend, Some(Trend::Rising));
        assert!(!s.fallback);
    }

    #[test]
    fn rm_summary_handles_zero_death_rate() {
        let f = fit(ModelKind::RossMacdonald, vec![0.2, 0.3, 0.3, 0.0], &[3.0, 2.0], 1.0);
        let s = summarize_fit(&f);
        assert_eq!(s.mosquito_lifespan, None);
        assert_eq!(s.recent_trend, None);

        let mut f = fit(ModelKind::RossMacdonald, vec![0.2, 0.3, 0.3, 0.1], &[3.0, 2.0], 1.0);
        f.outcome = FitOutcome::FallbackUsed {
            params: vec![0.2, 0.3, 0.3, 0.1],
            reason: OptimizeError::Stalled,
        };
        let s = summarize_fit(&f);
        assert!((s.mosquito_lifespan.unwrap() - 10.0).abs() < 1e-12);
        assert!(s.fallback);
    }

    #[test]
    fn best_fit_skips_nan() {
        let bundle = ResultBundle {
            series: ObservationSeries {
                t: vec![0],
                cases: vec![1.0],
                dates: Vec::new(),
                date_col: "date".to_string(),
                case_col: "cases".to_string(),
            },
            sir: Some(fit(ModelKind::Sir, vec![0.3, 0.1], &[1.0], f64::NAN)),
            rm: Some(fit(ModelKind::RossMacdonald, vec![0.2, 0.3, 0.3, 0.1], &[1.0], 2.0)),
        };
        assert_eq!(best_fit(&bundle).map(|f| f.model), Some(ModelKind::RossMacdonald));
    }
}
