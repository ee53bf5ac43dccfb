//! Ross–Macdonald vector–host model.
//!
//! Humans: `Sh, Ih, Rh`. Mosquitoes: `Sv, Iv`.
//!
//! ```text
//! dSh/dt = −a·b·Sh·Iv
//! dIh/dt =  a·b·Sh·Iv − r·Ih
//! dRh/dt =  r·Ih
//! dSv/dt = −a·c·Sv·Ih − μv·Sv
//! dIv/dt =  a·c·Sv·Ih − μv·Iv
//! ```
//!
//! The human recovery rate `r` is fixed at [`HUMAN_RECOVERY_RATE`] and is not
//! fitted. Mosquito deaths are not replaced, so the mosquito sub-total decays
//! at rate `μv` while the human sub-total is conserved.

use serde::{Deserialize, Serialize};

use crate::math::OdeSystem;

/// Human recovery rate per day (mean infectious period of 10 days).
pub const HUMAN_RECOVERY_RATE: f64 = 0.1;

/// Biting rate `a`, transmission probabilities `b` (mosquito→human) and `c`
/// (human→mosquito), mosquito mortality `μv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub mu_v: f64,
}

impl RmParams {
    pub const FALLBACK: RmParams = RmParams {
        a: 0.2,
        b: 0.3,
        c: 0.3,
        mu_v: 0.1,
    };

    pub const BOUNDS: (f64, f64) = (0.0, 2.0);

    pub fn to_vec(self) -> Vec<f64> {
        vec![self.a, self.b, self.c, self.mu_v]
    }

    /// Expected mosquito lifespan `1/μv`.
    pub fn mosquito_lifespan(&self) -> Option<f64> {
        (self.mu_v > 0.0).then(|| 1.0 / self.mu_v)
    }
}

impl Default for RmParams {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Population sizes needed to seed the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmPopulation {
    /// Total humans `N_h`.
    pub n_h: f64,
    /// Total mosquitoes `N_v`.
    pub n_v: f64,
    /// Initially infected mosquitoes.
    pub iv0: f64,
}

impl Default for RmPopulation {
    fn default() -> Self {
        Self {
            n_h: 1e6,
            n_v: 1e6,
            iv0: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RossMacdonald {
    pub params: RmParams,
    pub human_recovery: f64,
}

impl RossMacdonald {
    pub const DIM: usize = 5;

    pub fn new(params: RmParams) -> Self {
        Self {
            params,
            human_recovery: HUMAN_RECOVERY_RATE,
        }
    }

    /// `[N_h − ih0, ih0, 0, N_v − Iv0, Iv0]`.
    pub fn initial_state(ih0: f64, population: &RmPopulation) -> [f64; 5] {
        [
            population.n_h - ih0,
            ih0,
            0.0,
            population.n_v - population.iv0,
            population.iv0,
        ]
    }
}

impl OdeSystem for RossMacdonald {
    fn dim(&self) -> usize {
        Self::DIM
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let RmParams { a, b, c, mu_v } = self.params;
        let (sh, ih, sv, iv) = (y[0], y[1], y[3], y[4]);

        let human_infection = a * b * sh * iv;
        let human_recovery = self.human_recovery * ih;
        let vector_infection = a * c * sv * ih;

        dydt[0] = -human_infection;
        dydt[1] = human_infection - human_recovery;
        dydt[2] = human_recovery;
        dydt[3] = -vector_infection - mu_v * sv;
        dydt[4] = vector_infection - mu_v * iv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{OdeOptions, integrate};

    #[test]
    fn initial_state_splits_populations() {
        let pop = RmPopulation {
            n_h: 5_000_000.0,
            n_v: 500_000.0,
            iv0: 1000.0,
        };
        let y0 = RossMacdonald::initial_state(10.0, &pop);
        assert_eq!(y0, [4_999_990.0, 10.0, 0.0, 499_000.0, 1000.0]);
    }

    #[test]
    fn human_total_conserved_and_vectors_decay() {
        let model = RossMacdonald::new(RmParams::FALLBACK);
        let pop = RmPopulation {
            n_h: 1000.0,
            n_v: 2000.0,
            iv0: 5.0,
        };
        let y0 = RossMacdonald::initial_state(1.0, &pop);
        let times: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let sol = integrate(&model, &y0, &times, &OdeOptions::default()).unwrap();

        for (t, state) in times.iter().zip(&sol) {
            let humans = state[0] + state[1] + state[2];
            assert!((humans - 1000.0).abs() < 1e-6, "humans drifted to {humans} at t={t}");

            let vectors = state[3] + state[4];
            let expected = 2000.0 * (-RmParams::FALLBACK.mu_v * t).exp();
            assert!(
                (vectors - expected).abs() < 1e-4 * expected.max(1.0),
                "vectors {vectors} vs {expected} at t={t}"
            );
        }
    }

    #[test]
    fn stiff_million_scale_population_integrates() {
        let model = RossMacdonald::new(RmParams::FALLBACK);
        let pop = RmPopulation {
            n_h: 5_000_000.0,
            n_v: 500_000.0,
            iv0: 1000.0,
        };
        let y0 = RossMacdonald::initial_state(10.0, &pop);
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let sol = integrate(&model, &y0, &times, &OdeOptions::default()).unwrap();
        assert_eq!(sol.len(), 10);
        for state in &sol {
            let humans = state[0] + state[1] + state[2];
            assert!((humans - 5_000_000.0).abs() < 1e-3 * 5_000_000.0 * 1e-3);
        }
    }
}
