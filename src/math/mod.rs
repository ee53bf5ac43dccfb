//! Numerical building blocks: ODE integration and bounded least squares.

pub mod lsq;
pub mod ode;

pub use lsq::*;
pub use ode::*;
