//! Input/output helpers.
//!
//! - CSV ingest into a typed `Dataset` (`ingest`)
//! - run JSON and dataset CSV exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
