//! Short-horizon forecasts and trend reading.
//!
//! Forecasts step a fitted model forward from its last fitted state with
//! explicit Euler at unit step, independently per model.

use serde::{Deserialize, Serialize};

use crate::domain::{FitResult, ModelKind};
use crate::math::{OdeSystem, forward_euler};
use crate::models::{ModelError, ModelSystem};

pub const DEFAULT_HORIZON: usize = 7;

/// Samples compared by [`recent_trend`]: the last value against the one
/// `RECENT_WINDOW - 1` samples earlier.
pub const RECENT_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub model: ModelKind,
    /// Time of the state the forecast starts from.
    pub origin: f64,
    /// One state per step, `states[k]` at `origin + k + 1`.
    pub states: Vec<Vec<f64>>,
}

impl Forecast {
    pub fn horizon(&self) -> usize {
        self.states.len()
    }

    /// Forecast values of the observed compartment (`I` or `Ih`), NaN where a
    /// state is too short.
    pub fn values(&self) -> Vec<f64> {
        let idx = self.model.observed_component();
        self.states
            .iter()
            .map(|s| s.get(idx).copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn times(&self) -> Vec<f64> {
        (1..=self.states.len()).map(|k| self.origin + k as f64).collect()
    }

    pub fn trend(&self) -> Option<Trend> {
        forecast_trend(&self.values())
    }
}

/// Step `kind` forward `horizon` days from `final_state`.
pub fn forecast(
    kind: ModelKind,
    params: &[f64],
    final_state: &[f64],
    origin: f64,
    horizon: usize,
) -> Result<Forecast, ModelError> {
    let system = ModelSystem::new(kind, params)?;
    if final_state.len() != system.dim() {
        return Err(ModelError::StateDimension {
            model: kind.display_name(),
            expected: system.dim(),
            got: final_state.len(),
        });
    }
    Ok(Forecast {
        model: kind,
        origin,
        states: forward_euler(&system, final_state, origin, 1.0, horizon),
    })
}

/// Forecast from the last state of a fit.
pub fn forecast_fit(fit: &FitResult, horizon: usize) -> Result<Forecast, ModelError> {
    let kind = fit.model;
    let expected = kind.compartment_names().len();
    let (origin, state) = match (fit.trajectory.times.last(), fit.trajectory.final_state()) {
        (Some(&t), Some(state)) => (t, state),
        _ => {
            return Err(ModelError::StateDimension {
                model: kind.display_name(),
                expected,
                got: 0,
            });
        }
    };
    forecast(kind, fit.params(), state, origin, horizon)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
}

impl Trend {
    fn of(later: f64, earlier: f64) -> Self {
        if later > earlier {
            Trend::Rising
        } else {
            Trend::Falling
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
        }
    }
}

/// Trend over the last [`RECENT_WINDOW`] samples of a fitted curve.
/// `None` when the curve is shorter than the window.
pub fn recent_trend(values: &[f64]) -> Option<Trend> {
    if values.len() < RECENT_WINDOW {
        return None;
    }
    let last = values[values.len() - 1];
    let earlier = values[values.len() - RECENT_WINDOW];
    Some(Trend::of(last, earlier))
}

/// Trend across a forecast: last value against the first.
pub fn forecast_trend(values: &[f64]) -> Option<Trend> {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) => Some(Trend::of(last, first)),
        _ => None,
    }
}
