//! `epifit` library crate.
//!
//! Fits a closed-population SIR model and a vector-borne Ross–Macdonald model
//! to a case-count time series, reports goodness of fit and forecasts the next
//! days. The binary (`epifit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting engine can be driven with an in-memory `Dataset`

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
