//! Compartmental epidemic models.
//!
//! Each model is a parameter struct plus an [`OdeSystem`] implementation so the
//! integrator and the forecaster can stay generic over the state dimension.
//! [`ModelSystem`] picks the right one from a `ModelKind` and a flat parameter
//! slice, which is how fitted parameters travel through the pipeline.

pub mod ross_macdonald;
pub mod sir;

pub use ross_macdonald::*;
pub use sir::*;

use thiserror::Error;

use crate::domain::ModelKind;
use crate::math::OdeSystem;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{model} expects {expected} parameters, got {got}")]
    ParameterCount {
        model: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{model} state has {expected} compartments, got {got}")]
    StateDimension {
        model: &'static str,
        expected: usize,
        got: usize,
    },
}

/// A model with its coefficients bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelSystem {
    Sir(Sir),
    RossMacdonald(RossMacdonald),
}

impl ModelSystem {
    /// Build the system for `kind` from a flat parameter slice (in
    /// `kind.param_names()` order).
    pub fn new(kind: ModelKind, params: &[f64]) -> Result<Self, ModelError> {
        if params.len() != kind.param_names().len() {
            return Err(ModelError::ParameterCount {
                model: kind.display_name(),
                expected: kind.param_names().len(),
                got: params.len(),
            });
        }
        Ok(match kind {
            ModelKind::Sir => ModelSystem::Sir(Sir::new(SirParams {
                beta: params[0],
                gamma: params[1],
            })),
            ModelKind::RossMacdonald => ModelSystem::RossMacdonald(RossMacdonald::new(RmParams {
                a: params[0],
                b: params[1],
                c: params[2],
                mu_v: params[3],
            })),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSystem::Sir(_) => ModelKind::Sir,
            ModelSystem::RossMacdonald(_) => ModelKind::RossMacdonald,
        }
    }
}

impl OdeSystem for ModelSystem {
    fn dim(&self) -> usize {
        match self {
            ModelSystem::Sir(m) => m.dim(),
            ModelSystem::RossMacdonald(m) => m.dim(),
        }
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        match self {
            ModelSystem::Sir(m) => m.rhs(t, y, dydt),
            ModelSystem::RossMacdonald(m) => m.rhs(t, y, dydt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_flat_params() {
        let sys = ModelSystem::new(ModelKind::RossMacdonald, &[0.2, 0.3, 0.3, 0.1]).unwrap();
        assert_eq!(sys.kind(), ModelKind::RossMacdonald);
        assert_eq!(sys.dim(), 5);
    }

    #[test]
    fn rejects_wrong_param_count() {
        let err = ModelSystem::new(ModelKind::Sir, &[0.3]).unwrap_err();
        assert_eq!(
            err,
            ModelError::ParameterCount {
                model: "SIR",
                expected: 2,
                got: 1
            }
        );
    }
}
