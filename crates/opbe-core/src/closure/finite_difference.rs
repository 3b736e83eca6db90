// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Finite-Difference Sensitivity Closure
// ─────────────────────────────────────────────────────────────────────
//! Three states evolved together:
//!
//!   0: base initial condition
//!   1: base with slot 0 shifted by Δx1
//!   2: base with slot 1 shifted by Δx2
//!
//! and per resolved mode, with f_i the resolved feedback of state i and
//! a1 the base initial value of slot 0,
//!
//!   F = -ε·a1·(f1 - f0)/Δx1 - ½·a1²·(f2 - f0)/Δx2
//!
//! The linearisation is only meaningful for small Δx1, Δx2.

use opbe_physics::SpectralState;
use opbe_types::{ClosureConfig, OpbeError, OpbeResult};

use crate::closure::Estimate;
use crate::context::RunContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteDifferenceClosure {
    delta_x1: f64,
    delta_x2: f64,
}

impl FiniteDifferenceClosure {
    pub fn new(delta_x1: f64, delta_x2: f64) -> OpbeResult<Self> {
        for (name, d) in [("delta_x1", delta_x1), ("delta_x2", delta_x2)] {
            if !d.is_finite() || d == 0.0 {
                return Err(OpbeError::Config(format!(
                    "finite-difference: {name} must be finite and non-zero, got {d}"
                )));
            }
        }
        Ok(Self { delta_x1, delta_x2 })
    }

    pub fn from_context(ctx: &RunContext) -> OpbeResult<Self> {
        let ClosureConfig::FiniteDifference { delta_x1, delta_x2 } = ctx.config.closure else {
            return Err(OpbeError::Config(
                "finite-difference closure built from a different closure config".to_string(),
            ));
        };
        if ctx.num_modes() < 2 {
            return Err(OpbeError::Config(format!(
                "finite-difference closure perturbs two modes, only {} configured",
                ctx.num_modes()
            )));
        }
        Self::new(delta_x1, delta_x2)
    }

    pub fn deltas(&self) -> (f64, f64) {
        (self.delta_x1, self.delta_x2)
    }

    pub fn build_ensemble<'a>(&self, ctx: &'a RunContext) -> OpbeResult<Vec<SpectralState<'a>>> {
        let base = ctx.new_state()?;
        let mut first = ctx.new_state()?;
        first.set_initial_condition(0, base.initial_condition(0)? + self.delta_x1)?;
        first.reset_to_initial_condition();
        let mut second = ctx.new_state()?;
        second.set_initial_condition(1, base.initial_condition(1)? + self.delta_x2)?;
        second.reset_to_initial_condition();
        Ok(vec![base, first, second])
    }

    pub fn estimate(&self, ensemble: &[SpectralState<'_>], ctx: &RunContext) -> OpbeResult<Estimate> {
        let [base, first, second] = ensemble else {
            return Err(OpbeError::Config(format!(
                "finite-difference estimate needs 3 states, got {}",
                ensemble.len()
            )));
        };
        let a1 = base.initial_condition(0)?;
        let eps = ctx.params.viscosity;
        let mut feedback = Vec::with_capacity(ctx.num_resolved());
        for slot in 0..ctx.num_resolved() {
            let f0 = base.resolved_feedback(slot)?;
            let f1 = first.resolved_feedback(slot)?;
            let f2 = second.resolved_feedback(slot)?;
            feedback.push(
                -eps * a1 * (f1 - f0) / self.delta_x1 - 0.5 * a1 * a1 * (f2 - f0) / self.delta_x2,
            );
        }
        Ok(Estimate::feedback(feedback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use crate::problem::run_problem;
    use opbe_types::RunConfig;

    fn config(dx: f64) -> RunConfig {
        let mut c = RunConfig::new(
            4,
            0.1,
            0.0,
            0.5,
            ClosureConfig::FiniteDifference {
                delta_x1: dx,
                delta_x2: dx,
            },
        );
        c.num_resolved = Some(3);
        c.initial_conditions = vec![1.0, 0.5, 0.3, 0.2];
        c.integrator.absolute_error = 1e-12;
        c
    }

    #[test]
    fn test_ensemble_perturbs_two_slots() {
        let ctx = RunContext::new(config(1e-3)).unwrap();
        let fd = FiniteDifferenceClosure::from_context(&ctx).unwrap();
        let ens = fd.build_ensemble(&ctx).unwrap();
        assert_eq!(ens.len(), 3);
        assert_eq!(ens[0].initial_conditions(), &[1.0, 0.5, 0.3, 0.2]);
        assert_eq!(ens[1].initial_conditions(), &[1.0 + 1e-3, 0.5, 0.3, 0.2]);
        assert_eq!(ens[2].initial_conditions(), &[1.0, 0.5 + 1e-3, 0.3, 0.2]);
        assert_eq!(ens[1].modes(), ens[1].initial_conditions());
    }

    #[test]
    fn test_estimate_at_start_matches_analytic_derivative() {
        // At t=0 with R=3, N=4: f(slot 0) = ½·u3·u4, f(slot 1) = u2·u4,
        // f(slot 2) = 1.5·u1·u4. Feedback is linear in u1 and u2, so the
        // difference quotients are exact.
        let ctx = RunContext::new(config(1e-3)).unwrap();
        let fd = FiniteDifferenceClosure::from_context(&ctx).unwrap();
        let ens = fd.build_ensemble(&ctx).unwrap();
        let est = fd.estimate(&ens, &ctx).unwrap();
        let f = est.feedback.unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f[0], 0.0);
        let expected_2 = -0.5 * 1.0 * 0.2;
        assert!((f[1] - expected_2).abs() < 1e-9, "F_2 = {} vs {expected_2}", f[1]);
        let expected_3 = -0.1 * 1.0 * 1.5 * 0.2;
        assert!((f[2] - expected_3).abs() < 1e-9, "F_3 = {} vs {expected_3}", f[2]);
    }

    #[test]
    fn test_halving_perturbations_converges() {
        let mut coarse = MemorySink::new();
        let mut fine = MemorySink::new();
        run_problem(config(1e-4), &mut coarse).unwrap();
        run_problem(config(5e-5), &mut fine).unwrap();
        let a = coarse.records().last().unwrap().feedback.clone().unwrap();
        let b = fine.records().last().unwrap().feedback.clone().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            let bound = 1e-2 * (1.0 + x.abs());
            assert!((x - y).abs() < bound, "estimate moved {x} -> {y}, bound {bound}");
        }
    }

    #[test]
    fn test_single_mode_rejected() {
        let mut c = config(1e-3);
        c.mode_shape = [1, 0, 0];
        c.num_resolved = None;
        c.initial_conditions = vec![1.0];
        let ctx = RunContext::new(c).unwrap();
        assert!(FiniteDifferenceClosure::from_context(&ctx).is_err());
    }
}
