//! Error types.
//!
//! Library modules return typed errors (`PrepareError`, `IngestError`, ...).
//! The binary funnels everything into `AppError`, which carries the process
//! exit code alongside a printable message.

use crate::app::pipeline::PipelineError;
use crate::data::{PrepareError, SyntheticError};
use crate::io::IngestError;
use crate::models::ModelError;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<PrepareError> for AppError {
    fn from(err: PrepareError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Prepare(e) => e.into(),
            PipelineError::Fit(e) => AppError::new(2, format!("Cannot fit: {e}")),
        }
    }
}

impl From<SyntheticError> for AppError {
    fn from(err: SyntheticError) -> Self {
        match err {
            SyntheticError::Integration(_) | SyntheticError::Table(_) => {
                AppError::new(4, format!("Outbreak generation failed: {err}"))
            }
            _ => AppError::new(2, err.to_string()),
        }
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(4, format!("Forecast failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_errors_map_to_input_exit_code() {
        let err: AppError = PrepareError::NoDateColumnFound.into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("date"));
    }

    #[test]
    fn internal_failures_map_to_exit_code_4() {
        let err: AppError = ModelError::StateDimension {
            model: "SIR",
            expected: 3,
            got: 0,
        }
        .into();
        assert_eq!(err.exit_code(), 4);

        let err: AppError = SyntheticError::NoDays.into();
        assert_eq!(err.exit_code(), 2);
    }
}
