//! Model fitting.
//!
//! Responsibilities:
//!
//! - generic bounded least-squares fit of any `ModelSystem` (`fitter`)
//! - SIR specifics: initial state, bounds, fallback (`sir`)
//! - Ross–Macdonald specifics (`ross_macdonald`)

pub mod fitter;
pub mod ross_macdonald;
pub mod sir;

pub use fitter::*;
pub use ross_macdonald::*;
pub use sir::*;
