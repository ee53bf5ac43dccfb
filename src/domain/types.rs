//! Shared domain types.
//!
//! Everything here is plain data with serde derives, passed between:
//!
//! - the preparer, the fitters and the forecaster
//! - the run JSON export (and `epifit report` reading it back)
//! - the terminal summary

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::math::{LsqOptions, OdeOptions, OptimizeError};
use crate::models::{RmParams, RmPopulation, SirParams};

/// Which epidemic model a fit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Sir,
    RossMacdonald,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Sir => "SIR",
            ModelKind::RossMacdonald => "Ross–Macdonald",
        }
    }

    /// Short key used in the result bundle.
    pub fn key(self) -> &'static str {
        match self {
            ModelKind::Sir => "sir",
            ModelKind::RossMacdonald => "rm",
        }
    }

    /// Fitted coefficient names, in the order they appear in parameter slices.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Sir => &["beta", "gamma"],
            ModelKind::RossMacdonald => &["a", "b", "c", "mu_v"],
        }
    }

    pub fn compartment_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Sir => &["S", "I", "R"],
            ModelKind::RossMacdonald => &["Sh", "Ih", "Rh", "Sv", "Iv"],
        }
    }

    /// Index of the compartment compared against observed cases
    /// (`I` for SIR, `Ih` for Ross–Macdonald).
    pub fn observed_component(self) -> usize {
        1
    }
}

/// Observed case counts aligned to a positional time index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    /// `0, 1, 2, ...` after sorting by date.
    pub t: Vec<usize>,
    /// Case counts, same order as `t`.
    pub cases: Vec<f64>,
    /// Parsed dates, same order as `t`.
    pub dates: Vec<NaiveDateTime>,
    pub date_col: String,
    pub case_col: String,
}

impl ObservationSeries {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Time index as floats, the grid handed to the integrator.
    pub fn times(&self) -> Vec<f64> {
        self.t.iter().map(|&i| i as f64).collect()
    }
}

/// Model states at each sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    /// One state vector per entry of `times`.
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// One compartment over time.
    pub fn component(&self, idx: usize) -> Vec<f64> {
        self.states
            .iter()
            .map(|s| s.get(idx).copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }
}

/// How the parameters of a fit were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    /// The optimizer converged.
    Converged { params: Vec<f64>, iterations: usize },
    /// The optimizer failed; literature defaults were substituted.
    FallbackUsed {
        params: Vec<f64>,
        reason: OptimizeError,
    },
}

impl FitOutcome {
    pub fn params(&self) -> &[f64] {
        match self {
            FitOutcome::Converged { params, .. } | FitOutcome::FallbackUsed { params, .. } => params,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FitOutcome::FallbackUsed { .. })
    }
}

/// Output of one model fit. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub trajectory: Trajectory,
    /// Root-mean-square error between the observed compartment and the data.
    pub rmse: f64,
    pub outcome: FitOutcome,
}

impl FitResult {
    pub fn params(&self) -> &[f64] {
        self.outcome.params()
    }

    /// Fitted values of the observed compartment.
    pub fn fitted(&self) -> Vec<f64> {
        self.trajectory.component(self.model.observed_component())
    }
}

/// Numerical settings shared by both fitters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitSettings {
    pub ode: OdeOptions,
    pub lsq: LsqOptions,
}

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub use_sir: bool,
    pub use_rm: bool,
    /// Total humans `N_h`.
    pub n_h: f64,
    /// Total mosquitoes `N_v`.
    pub n_v: f64,
    /// Initially infected mosquitoes.
    pub iv0: f64,
    /// Explicit date column; auto-detected when `None`.
    pub date_col: Option<String>,
    /// Explicit case column; auto-detected when `None`.
    pub case_col: Option<String>,
    /// Optimizer starting point for SIR.
    pub sir_guess: SirParams,
    /// Optimizer starting point for Ross–Macdonald.
    pub rm_guess: RmParams,
    pub fit: FitSettings,
}

impl PipelineConfig {
    pub fn population(&self) -> RmPopulation {
        RmPopulation {
            n_h: self.n_h,
            n_v: self.n_v,
            iv0: self.iv0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let population = RmPopulation::default();
        Self {
            use_sir: true,
            use_rm: true,
            n_h: population.n_h,
            n_v: population.n_v,
            iv0: population.iv0,
            date_col: None,
            case_col: None,
            sir_guess: SirParams::default(),
            rm_guess: RmParams::default(),
            fit: FitSettings::default(),
        }
    }
}

/// Everything one pipeline invocation produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub series: ObservationSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sir: Option<FitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rm: Option<FitResult>,
}

impl ResultBundle {
    pub fn get(&self, kind: ModelKind) -> Option<&FitResult> {
        match kind {
            ModelKind::Sir => self.sir.as_ref(),
            ModelKind::RossMacdonald => self.rm.as_ref(),
        }
    }

    /// Fits present in the bundle, SIR first.
    pub fn fits(&self) -> impl Iterator<Item = &FitResult> {
        self.sir.iter().chain(self.rm.iter())
    }
}
