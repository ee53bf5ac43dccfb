//! Numerical integration of ordinary differential equations.
//!
//! The fitters need the state of a small ODE system at every observation time,
//! many times over (once per optimizer trial point and Jacobian column), so the
//! integrator is built around a reusable stepper that walks a time grid:
//!
//! - **Dormand–Prince 5(4)** is the workhorse: explicit, adaptive, FSAL.
//! - **Rosenbrock 2(3)** (the L-stable pair behind MATLAB's `ode23s`) takes over
//!   once the explicit method detects stiffness. Mass-action systems with raw
//!   population counts (e.g. millions of hosts) become stiff as soon as one
//!   compartment is depleted, and an explicit method would crawl there.
//!
//! With `OdeMethod::Auto` the stepper starts explicit and switches at most once
//! per `integrate` call.
//!
//! A separate fixed-step `forward_euler` routine is provided for cheap
//! short-horizon extrapolation.

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A first-order ODE system `dy/dt = f(t, y)`.
///
/// Parameters are carried by the implementing type, so a system value is
/// "the right-hand side with its coefficients bound".
pub trait OdeSystem {
    /// State dimension.
    fn dim(&self) -> usize;

    /// Write `f(t, y)` into `dydt` (`dydt.len() == y.len() == self.dim()`).
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Adapter turning a closure into an [`OdeSystem`].
pub struct FnSystem<F> {
    dim: usize,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> OdeSystem for FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        (self.f)(t, y, dydt)
    }
}

/// Which stepping scheme `integrate` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OdeMethod {
    /// Start with Dormand–Prince, switch to Rosenbrock on detected stiffness.
    Auto,
    DormandPrince,
    Rosenbrock,
}

/// Integrator tolerances and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdeOptions {
    pub method: OdeMethod,
    pub rtol: f64,
    pub atol: f64,
    /// Upper bound on attempted steps (accepted + rejected) per `integrate` call.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            method: OdeMethod::Auto,
            rtol: 1e-8,
            atol: 1e-8,
            max_steps: 200_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum OdeError {
    #[error("time grid must be non-empty, finite and strictly increasing")]
    InvalidTimeGrid,
    #[error("initial state has {got} components, system expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("step size underflow at t={t}")]
    StepSizeUnderflow { t: f64 },
    #[error("step budget of {max_steps} exhausted at t={t}")]
    TooManySteps { t: f64, max_steps: usize },
    #[error("non-finite initial state")]
    NonFinite,
}

/// Integrate `system` from `y0` at `times[0]` and return the state at every
/// entry of `times` (the first row is `y0` itself).
pub fn integrate<S>(
    system: &S,
    y0: &[f64],
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<Vec<f64>>, OdeError>
where
    S: OdeSystem + ?Sized,
{
    if times.is_empty()
        || times.iter().any(|t| !t.is_finite())
        || times.windows(2).any(|w| w[1] <= w[0])
    {
        return Err(OdeError::InvalidTimeGrid);
    }
    if y0.len() != system.dim() {
        return Err(OdeError::DimensionMismatch {
            expected: system.dim(),
            got: y0.len(),
        });
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(OdeError::NonFinite);
    }

    let mut out = Vec::with_capacity(times.len());
    out.push(y0.to_vec());
    if times.len() == 1 {
        return Ok(out);
    }

    let mut stepper = Stepper::new(system, opts, times[0], y0, times[1] - times[0]);
    for &target in &times[1..] {
        stepper.advance_to(target)?;
        out.push(stepper.y.clone());
    }

    debug!(
        steps = stepper.steps,
        method = ?stepper.method,
        "integration finished"
    );
    Ok(out)
}

/// Advance `y0` by `n` explicit Euler steps of size `dt`, starting at `t0`.
///
/// Returns the `n` states after each step (not including `y0`).
pub fn forward_euler<S>(system: &S, y0: &[f64], t0: f64, dt: f64, n: usize) -> Vec<Vec<f64>>
where
    S: OdeSystem + ?Sized,
{
    let mut y = y0.to_vec();
    let mut dydt = vec![0.0; y.len()];
    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        let t = t0 + k as f64 * dt;
        system.rhs(t, &y, &mut dydt);
        for (yi, di) in y.iter_mut().zip(&dydt) {
            *yi += di * dt;
        }
        out.push(y.clone());
    }
    out
}

// Dormand–Prince 5(4) tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// 5th minus embedded 4th order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// `h·λ` above which a Dormand–Prince step counts as stiff (Hairer & Wanner).
const STIFF_HLAMBDA: f64 = 3.25;
/// Consecutive stiff steps before switching to the Rosenbrock method.
const STIFF_STEPS_TO_SWITCH: usize = 15;
/// Consecutive non-stiff steps that reset the stiffness counter.
const NONSTIFF_STEPS_TO_RESET: usize = 6;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    DormandPrince,
    Rosenbrock,
}

struct StepOutcome {
    accepted: bool,
    h_next: f64,
}

struct Stepper<'a, S: ?Sized> {
    system: &'a S,
    opts: &'a OdeOptions,
    method: Active,
    auto_switch: bool,
    t: f64,
    y: Vec<f64>,
    h: f64,
    steps: usize,
    /// `f(t, y)` at the current point (FSAL for Dormand–Prince).
    f0: Vec<f64>,
    stiff_count: usize,
    nonstiff_count: usize,
    /// Jacobian at the current point, reused across rejected Rosenbrock steps.
    jac: Option<DMatrix<f64>>,
    // Scratch buffers.
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
}

impl<'a, S> Stepper<'a, S>
where
    S: OdeSystem + ?Sized,
{
    fn new(system: &'a S, opts: &'a OdeOptions, t0: f64, y0: &[f64], first_span: f64) -> Self {
        let n = y0.len();
        let (method, auto_switch) = match opts.method {
            OdeMethod::Auto => (Active::DormandPrince, true),
            OdeMethod::DormandPrince => (Active::DormandPrince, false),
            OdeMethod::Rosenbrock => (Active::Rosenbrock, false),
        };
        let mut f0 = vec![0.0; n];
        system.rhs(t0, y0, &mut f0);
        Self {
            system,
            opts,
            method,
            auto_switch,
            t: t0,
            y: y0.to_vec(),
            h: (first_span * 1e-2).max(1e-6),
            steps: 0,
            f0,
            stiff_count: 0,
            nonstiff_count: 0,
            jac: None,
            k: std::array::from_fn(|_| vec![0.0; n]),
            y_stage: vec![0.0; n],
            y_new: vec![0.0; n],
        }
    }

    fn advance_to(&mut self, target: f64) -> Result<(), OdeError> {
        while self.t < target {
            if self.steps >= self.opts.max_steps {
                return Err(OdeError::TooManySteps {
                    t: self.t,
                    max_steps: self.opts.max_steps,
                });
            }
            if self.h <= 16.0 * f64::EPSILON * self.t.abs().max(1.0) {
                return Err(OdeError::StepSizeUnderflow { t: self.t });
            }

            let remaining = target - self.t;
            let clamped = self.h >= remaining;
            let h = if clamped { remaining } else { self.h };
            self.steps += 1;

            let outcome = match self.method {
                Active::DormandPrince => self.dormand_prince_step(h),
                Active::Rosenbrock => self.rosenbrock_step(h),
            };

            if outcome.accepted {
                self.t = if clamped { target } else { self.t + h };
                std::mem::swap(&mut self.y, &mut self.y_new);
                // A step shortened to land on the grid says little about the
                // natural step size; keep the larger proposal.
                self.h = if clamped {
                    outcome.h_next.max(self.h)
                } else {
                    outcome.h_next
                };
            } else {
                self.h = outcome.h_next;
            }
        }
        Ok(())
    }

    fn error_norm(&self, err: &[f64]) -> f64 {
        let n = err.len().max(1) as f64;
        let sum: f64 = err
            .iter()
            .zip(self.y.iter().zip(&self.y_new))
            .map(|(e, (y0, y1))| {
                let sc = self.opts.atol + self.opts.rtol * y0.abs().max(y1.abs());
                (e / sc).powi(2)
            })
            .sum();
        (sum / n).sqrt()
    }

    fn dormand_prince_step(&mut self, h: f64) -> StepOutcome {
        let n = self.y.len();
        let t = self.t;
        let [k1, k2, k3, k4, k5, k6, k7] = &mut self.k;
        k1.copy_from_slice(&self.f0);

        for i in 0..n {
            self.y_stage[i] = self.y[i] + h * A21 * k1[i];
        }
        self.system.rhs(t + C2 * h, &self.y_stage, k2);

        for i in 0..n {
            self.y_stage[i] = self.y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        self.system.rhs(t + C3 * h, &self.y_stage, k3);

        for i in 0..n {
            self.y_stage[i] = self.y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        self.system.rhs(t + C4 * h, &self.y_stage, k4);

        for i in 0..n {
            self.y_stage[i] =
                self.y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        self.system.rhs(t + C5 * h, &self.y_stage, k5);

        for i in 0..n {
            self.y_stage[i] = self.y[i]
                + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        self.system.rhs(t + h, &self.y_stage, k6);

        for i in 0..n {
            self.y_new[i] = self.y[i]
                + h * (A71 * k1[i] + A73 * k3[i] + A74 * k4[i] + A75 * k5[i] + A76 * k6[i]);
        }
        self.system.rhs(t + h, &self.y_new, k7);

        let err: Vec<f64> = (0..n)
            .map(|i| {
                h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i])
            })
            .collect();

        // Stiffness estimate: k7 and k6 are f evaluated at y_new and y_stage.
        let mut stnum = 0.0;
        let mut stden = 0.0;
        for i in 0..n {
            stnum += (k7[i] - k6[i]).powi(2);
            stden += (self.y_new[i] - self.y_stage[i]).powi(2);
        }

        let err_norm = self.error_norm(&err);
        let finite = err_norm.is_finite() && self.y_new.iter().all(|v| v.is_finite());
        if !finite {
            return StepOutcome {
                accepted: false,
                h_next: h * 0.25,
            };
        }

        let factor = if err_norm == 0.0 {
            MAX_FACTOR
        } else {
            (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
        };

        if err_norm > 1.0 {
            return StepOutcome {
                accepted: false,
                h_next: h * factor.min(1.0),
            };
        }

        self.f0.copy_from_slice(&self.k[6]);

        if self.auto_switch && stden > 0.0 {
            let h_lambda = h * (stnum / stden).sqrt();
            if h_lambda > STIFF_HLAMBDA {
                self.nonstiff_count = 0;
                self.stiff_count += 1;
                if self.stiff_count >= STIFF_STEPS_TO_SWITCH {
                    debug!(t = self.t + h, "stiffness detected, switching to Rosenbrock");
                    self.method = Active::Rosenbrock;
                    self.auto_switch = false;
                    self.jac = None;
                }
            } else {
                self.nonstiff_count += 1;
                if self.nonstiff_count >= NONSTIFF_STEPS_TO_RESET {
                    self.stiff_count = 0;
                }
            }
        }

        StepOutcome {
            accepted: true,
            h_next: h * factor,
        }
    }

    /// Forward-difference Jacobian `∂f/∂y` at the current point.
    fn jacobian(&self) -> DMatrix<f64> {
        let n = self.y.len();
        let sqrt_eps = f64::EPSILON.sqrt();
        let mut jac = DMatrix::<f64>::zeros(n, n);
        let mut y_pert = self.y.clone();
        let mut f_pert = vec![0.0; n];

        for j in 0..n {
            let delta = sqrt_eps * self.y[j].abs().max(1.0);
            y_pert[j] = self.y[j] + delta;
            self.system.rhs(self.t, &y_pert, &mut f_pert);
            for i in 0..n {
                jac[(i, j)] = (f_pert[i] - self.f0[i]) / delta;
            }
            y_pert[j] = self.y[j];
        }
        jac
    }

    /// Forward-difference `∂f/∂t` at the current point.
    fn time_derivative(&self) -> DVector<f64> {
        let n = self.y.len();
        let dt = f64::EPSILON.sqrt() * self.t.abs().max(1.0);
        let mut f_pert = vec![0.0; n];
        self.system.rhs(self.t + dt, &self.y, &mut f_pert);
        DVector::from_iterator(n, (0..n).map(|i| (f_pert[i] - self.f0[i]) / dt))
    }

    fn rosenbrock_step(&mut self, h: f64) -> StepOutcome {
        let n = self.y.len();
        let d = 1.0 / (2.0 + std::f64::consts::SQRT_2);
        let e32 = 6.0 + std::f64::consts::SQRT_2;

        let jac = match self.jac.take() {
            Some(j) => j,
            None => self.jacobian(),
        };
        let dfdt = self.time_derivative();

        let w = DMatrix::<f64>::identity(n, n) - &jac * (h * d);
        let lu = w.lu();
        let f0 = DVector::from_column_slice(&self.f0);

        let Some(k1) = lu.solve(&(&f0 + &dfdt * (h * d))) else {
            self.jac = Some(jac);
            return StepOutcome {
                accepted: false,
                h_next: h * 0.5,
            };
        };

        for i in 0..n {
            self.y_stage[i] = self.y[i] + 0.5 * h * k1[i];
        }
        let mut f1 = vec![0.0; n];
        self.system.rhs(self.t + 0.5 * h, &self.y_stage, &mut f1);
        let f1 = DVector::from_vec(f1);

        let Some(k2_part) = lu.solve(&(&f1 - &k1)) else {
            self.jac = Some(jac);
            return StepOutcome {
                accepted: false,
                h_next: h * 0.5,
            };
        };
        let k2 = k2_part + &k1;

        for i in 0..n {
            self.y_new[i] = self.y[i] + h * k2[i];
        }
        let mut f2 = vec![0.0; n];
        self.system.rhs(self.t + h, &self.y_new, &mut f2);
        let f2_vec = DVector::from_column_slice(&f2);

        let rhs3 = &f2_vec - (&k2 - &f1) * e32 - (&k1 - &f0) * 2.0 + &dfdt * (h * d);
        let Some(k3) = lu.solve(&rhs3) else {
            self.jac = Some(jac);
            return StepOutcome {
                accepted: false,
                h_next: h * 0.5,
            };
        };

        let err: Vec<f64> = (0..n)
            .map(|i| h / 6.0 * (k1[i] - 2.0 * k2[i] + k3[i]))
            .collect();
        let err_norm = self.error_norm(&err);
        let finite = err_norm.is_finite() && self.y_new.iter().all(|v| v.is_finite());
        if !finite {
            self.jac = Some(jac);
            return StepOutcome {
                accepted: false,
                h_next: h * 0.25,
            };
        }

        let factor = if err_norm == 0.0 {
            MAX_FACTOR
        } else {
            (0.8 * err_norm.powf(-1.0 / 3.0)).clamp(MIN_FACTOR, MAX_FACTOR)
        };

        if err_norm > 1.0 {
            self.jac = Some(jac);
            return StepOutcome {
                accepted: false,
                h_next: h * factor.min(1.0),
            };
        }

        // New point, new Jacobian on the next step.
        self.f0.copy_from_slice(&f2);
        StepOutcome {
            accepted: true,
            h_next: h * factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(rate: f64) -> FnSystem<impl Fn(f64, &[f64], &mut [f64])> {
        FnSystem::new(1, move |_t, y, dy| dy[0] = -rate * y[0])
    }

    #[test]
    fn exponential_decay_matches_closed_form() {
        let times: Vec<f64> = (0..11).map(|i| i as f64).collect();
        for method in [OdeMethod::DormandPrince, OdeMethod::Rosenbrock, OdeMethod::Auto] {
            let opts = OdeOptions {
                method,
                ..OdeOptions::default()
            };
            let sol = integrate(&decay(0.5), &[2.0], &times, &opts).unwrap();
            assert_eq!(sol.len(), times.len());
            for (t, y) in times.iter().zip(&sol) {
                let exact = 2.0 * (-0.5 * t).exp();
                assert!(
                    (y[0] - exact).abs() < 1e-5,
                    "{method:?} at t={t}: got {}, expected {exact}",
                    y[0]
                );
            }
        }
    }

    #[test]
    fn first_row_is_initial_state() {
        let sol = integrate(&decay(1.0), &[3.0], &[5.0, 6.0], &OdeOptions::default()).unwrap();
        assert_eq!(sol[0], vec![3.0]);
    }

    #[test]
    fn stiff_problem_switches_and_stays_accurate() {
        // y' = -1000 (y - cos t): fast relaxation onto a slow manifold.
        let system = FnSystem::new(1, |t: f64, y: &[f64], dy: &mut [f64]| {
            dy[0] = -1000.0 * (y[0] - t.cos())
        });
        let times: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        let opts = OdeOptions {
            max_steps: 20_000,
            ..OdeOptions::default()
        };
        let sol = integrate(&system, &[0.0], &times, &opts).unwrap();
        let last = sol.last().unwrap()[0];
        // Slow manifold: y ≈ cos t + sin t / 1000.
        let t = 10.0_f64;
        let expected = t.cos() + t.sin() / 1000.0;
        assert!((last - expected).abs() < 1e-5, "got {last}, expected {expected}");
    }

    #[test]
    fn rejects_bad_time_grid() {
        let err = integrate(&decay(1.0), &[1.0], &[0.0, 0.0], &OdeOptions::default());
        assert_eq!(err, Err(OdeError::InvalidTimeGrid));
        let err = integrate(&decay(1.0), &[1.0], &[], &OdeOptions::default());
        assert_eq!(err, Err(OdeError::InvalidTimeGrid));
    }

    #[test]
    fn rejects_wrong_dimension() {
        let err = integrate(&decay(1.0), &[1.0, 2.0], &[0.0, 1.0], &OdeOptions::default());
        assert_eq!(
            err,
            Err(OdeError::DimensionMismatch {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn forward_euler_takes_unit_steps() {
        let states = forward_euler(&decay(0.5), &[8.0], 0.0, 1.0, 3);
        assert_eq!(states, vec![vec![4.0], vec![2.0], vec![1.0]]);
    }
}
