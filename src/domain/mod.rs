//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the prepared observation series (`ObservationSeries`)
//! - fit outputs (`Trajectory`, `FitOutcome`, `FitResult`)
//! - the pipeline configuration and result bundle

pub mod types;

pub use types::*;
