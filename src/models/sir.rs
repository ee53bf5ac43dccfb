//! Closed-population SIR model.
//!
//! ```text
//! dS/dt = -β·S·I
//! dI/dt =  β·S·I − γ·I
//! dR/dt =  γ·I
//! ```
//!
//! The initial condition normalizes the population to 1 (`S0 = 1 − I0`) and
//! `I0` is the first observation as-is, so raw case counts are fitted against
//! a unit population. Feed fractions if the SIR parameters should be
//! interpretable.

use serde::{Deserialize, Serialize};

use crate::math::OdeSystem;

/// Transmission and recovery rates (per time step).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirParams {
    pub beta: f64,
    pub gamma: f64,
}

impl SirParams {
    /// Literature defaults used when the optimizer gives up.
    pub const FALLBACK: SirParams = SirParams {
        beta: 0.3,
        gamma: 0.1,
    };

    /// Box constraint applied to both rates during fitting.
    pub const BOUNDS: (f64, f64) = (0.0, 10.0);

    pub fn to_vec(self) -> Vec<f64> {
        vec![self.beta, self.gamma]
    }

    /// Mean infectious period `1/γ`; `None` when nobody recovers.
    pub fn infectious_period(&self) -> Option<f64> {
        (self.gamma > 0.0).then(|| 1.0 / self.gamma)
    }
}

impl Default for SirParams {
    fn default() -> Self {
        Self::FALLBACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sir {
    pub params: SirParams,
}

impl Sir {
    pub const DIM: usize = 3;

    pub fn new(params: SirParams) -> Self {
        Self { params }
    }

    /// `[S0, I0, R0] = [1 − i0, i0, 0]`.
    pub fn initial_state(i0: f64) -> [f64; 3] {
        [1.0 - i0, i0, 0.0]
    }
}

impl OdeSystem for Sir {
    fn dim(&self) -> usize {
        Self::DIM
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let SirParams { beta, gamma } = self.params;
        let (s, i) = (y[0], y[1]);
        let infection = beta * s * i;
        let recovery = gamma * i;
        dydt[0] = -infection;
        dydt[1] = infection - recovery;
        dydt[2] = recovery;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{OdeOptions, integrate};

    #[test]
    fn derivatives_sum_to_zero() {
        let sir = Sir::new(SirParams {
            beta: 0.8,
            gamma: 0.25,
        });
        let mut d = [0.0; 3];
        sir.rhs(0.0, &[0.7, 0.2, 0.1], &mut d);
        assert!((d[0] + d[1] + d[2]).abs() < 1e-15);
        assert!((d[0] + 0.8 * 0.7 * 0.2).abs() < 1e-15);
    }

    #[test]
    fn integration_conserves_population() {
        let sir = Sir::new(SirParams {
            beta: 0.6,
            gamma: 0.2,
        });
        let y0 = Sir::initial_state(0.01);
        let times: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let sol = integrate(&sir, &y0, &times, &OdeOptions::default()).unwrap();
        for state in &sol {
            let total: f64 = state.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "total drifted to {total}");
        }
        // Epidemic peaks and burns out.
        let peak = sol.iter().map(|s| s[1]).fold(0.0, f64::max);
        assert!(peak > 0.1);
        assert!(sol.last().unwrap()[1] < peak);
    }

    #[test]
    fn infectious_period_is_reciprocal_gamma() {
        assert_eq!(SirParams::FALLBACK.infectious_period(), Some(10.0));
        let none = SirParams {
            beta: 1.0,
            gamma: 0.0,
        };
        assert_eq!(none.infectious_period(), None);
    }
}
