// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Monte-Carlo Averaging Closure
// ─────────────────────────────────────────────────────────────────────
//! One state, `num_runs` independent trajectories. Each run draws every
//! mode's initial value from its density, then at every output time
//! folds the sample
//!
//!   x = −F_i · S
//!
//! into a streaming mean per (output time, resolved mode):
//!
//!   mean ← mean·(1 − 1/n) + x·(1/n),   n = 1 replaces the mean.
//!
//! S is the viscous-divergence correction evaluated once per run at the
//! sampled initial state:
//!
//!   S = −ε·N(2N²+3N+1)/6 + Σ_{k even ≤ N} ½·k·u_k
//!       + Σ_i u̇_i · (−(u_i − μ_i)/σ_i²)
//!
//! The physical derivation of S has not been checked; the formula is
//! kept as-is.
//!
//! Runs are sequential and share one `RandomSource`, so a fixed seed
//! reproduces the means bit for bit.

use opbe_physics::{expand_to_modes, Density, RandomSource, SpectralState};
use opbe_types::{ClosureConfig, OpbeError, OpbeResult};

use crate::closure::Estimate;
use crate::context::RunContext;

/// Incremental arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    value: f64,
    count: u64,
}

impl RunningMean {
    /// Fold in one sample and return the updated mean.
    pub fn push(&mut self, sample: f64) -> f64 {
        self.count += 1;
        if self.count == 1 {
            self.value = sample;
        } else {
            let fa = 1.0 / self.count as f64;
            let fb = 1.0 - fa;
            self.value = self.value * fb + sample * fa;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// S at the state's current (initial) values.
pub fn viscous_divergence_correction(
    state: &SpectralState<'_>,
    densities: &[Density],
    viscosity: f64,
) -> OpbeResult<f64> {
    let u = state.modes();
    let n = u.len();
    if densities.len() != n {
        return Err(OpbeError::Config(format!(
            "divergence correction: {} densities for {n} modes",
            densities.len()
        )));
    }
    let nf = n as f64;
    let sum_k2 = nf * (2.0 * nf * nf + 3.0 * nf + 1.0) / 6.0;
    let mut div = -sum_k2 * viscosity;
    for k in (2..=n).step_by(2) {
        div += 0.5 * k as f64 * u[k - 1];
    }
    let rhs = state.compute_rhs()?;
    for ((du, x), d) in rhs.iter().zip(u).zip(densities) {
        div += du * (-(x - d.mean()) / d.variance());
    }
    Ok(div)
}

#[derive(Debug, Clone)]
pub struct MonteCarloClosure {
    num_runs: usize,
    print_increment: Option<usize>,
    densities: Vec<Density>,
    /// `[output time][resolved slot]`
    means: Vec<Vec<RunningMean>>,
    correction: f64,
}

impl MonteCarloClosure {
    pub fn from_context(ctx: &RunContext) -> OpbeResult<Self> {
        let ClosureConfig::MonteCarlo {
            num_runs,
            print_run_count_increment,
        } = ctx.config.closure
        else {
            return Err(OpbeError::Config(
                "monte-carlo closure built from a different closure config".to_string(),
            ));
        };
        if num_runs == 0 {
            return Err(OpbeError::Config("monte-carlo num_runs must be > 0".to_string()));
        }
        let densities = expand_to_modes(&ctx.densities, ctx.num_modes())?;
        let means = vec![vec![RunningMean::default(); ctx.num_resolved()]; ctx.schedule.len()];
        Ok(Self {
            num_runs,
            print_increment: print_run_count_increment.filter(|k| *k > 0),
            densities,
            means,
            correction: 0.0,
        })
    }

    pub fn num_runs(&self) -> usize {
        self.num_runs
    }

    pub fn densities(&self) -> &[Density] {
        &self.densities
    }

    /// Current means at output step `step`.
    pub fn means_at(&self, step: usize) -> Option<Vec<f64>> {
        self.means
            .get(step)
            .map(|row| row.iter().map(RunningMean::value).collect())
    }

    pub fn build_ensemble<'a>(&self, ctx: &'a RunContext) -> OpbeResult<Vec<SpectralState<'a>>> {
        Ok(vec![ctx.new_state()?])
    }

    /// Draw a fresh initial condition and recompute S. Pass 0 also
    /// clears the means.
    pub fn prepare_pass(
        &mut self,
        pass: usize,
        ensemble: &mut [SpectralState<'_>],
        ctx: &RunContext,
        rng: &RandomSource,
    ) -> OpbeResult<()> {
        let state = ensemble.first_mut().ok_or_else(|| {
            OpbeError::Config("monte-carlo pass with an empty ensemble".to_string())
        })?;
        if pass == 0 {
            for row in self.means.iter_mut() {
                row.fill(RunningMean::default());
            }
        }
        let sampled = self
            .densities
            .iter()
            .map(|d| d.sample(rng))
            .collect::<OpbeResult<Vec<f64>>>()?;
        state.set_initial_conditions(&sampled)?;
        state.reset_to_initial_condition();
        self.correction = viscous_divergence_correction(state, &self.densities, ctx.params.viscosity)?;

        let run = pass + 1;
        if let Some(k) = self.print_increment {
            if run % k == 0 {
                log::info!("monte-carlo: run {run} of {}", self.num_runs);
            }
        }
        Ok(())
    }

    pub fn accumulate(
        &mut self,
        step: usize,
        ensemble: &[SpectralState<'_>],
        ctx: &RunContext,
    ) -> OpbeResult<Estimate> {
        let state = ensemble.first().ok_or_else(|| {
            OpbeError::Config("monte-carlo estimate with an empty ensemble".to_string())
        })?;
        let row = self.means.get_mut(step).ok_or_else(|| {
            OpbeError::Index(format!("monte-carlo: output step {step} outside the schedule"))
        })?;
        let mut feedback = Vec::with_capacity(ctx.num_resolved());
        for (slot, mean) in row.iter_mut().enumerate() {
            let sample = -state.resolved_feedback(slot)? * self.correction;
            feedback.push(mean.push(sample));
        }
        Ok(Estimate::feedback(feedback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use crate::problem::run_problem;
    use opbe_physics::{ModeIndex, PhysicalParams, RunSettings};
    use opbe_types::{DensitySpec, RunConfig};

    fn config(num_runs: usize) -> RunConfig {
        let mut c = RunConfig::new(
            3,
            0.1,
            0.0,
            0.2,
            ClosureConfig::MonteCarlo {
                num_runs,
                print_run_count_increment: Some(2),
            },
        );
        c.num_resolved = Some(2);
        c.random_seed = 11;
        c.densities = vec![
            DensitySpec {
                kind: "1dgaussian".into(),
                parameters: vec![0.5, 0.1, 0.0],
            },
            DensitySpec {
                kind: "1dgaussian".into(),
                parameters: vec![0.0, 0.05, 2.0],
            },
        ];
        c.output.time_step = Some(0.1);
        c
    }

    #[test]
    fn test_running_mean_sequence() {
        let mut m = RunningMean::default();
        assert_eq!(m.push(2.0), 2.0);
        assert_eq!(m.push(4.0), 3.0);
        assert_eq!(m.push(6.0), 4.0);
        assert_eq!(m.count(), 3);
    }

    #[test]
    fn test_running_mean_first_sample_replaces() {
        let mut m = RunningMean {
            value: 99.0,
            count: 0,
        };
        assert_eq!(m.push(-1.5), -1.5);
    }

    #[test]
    fn test_correction_hand_computed() {
        // N=2, ε=0.5, u=[1, 2], μ=0, σ=1:
        //   −ε·Σk² = −2.5, even term ½·2·u2 = 2
        //   u̇ = [½·u1u2 − ε·u1, −4ε·u2 − ½·u1²] = [0.5, −4.5]
        //   Σ u̇_i·(−u_i) = −0.5 + 9 = 8.5
        let index = ModeIndex::one_dimensional(2, 2).unwrap();
        let params = PhysicalParams::new(0.5).unwrap();
        let mut cfg = RunConfig::new(2, 0.5, 0.0, 1.0, ClosureConfig::NoClosure);
        cfg.initial_conditions = vec![1.0, 2.0];
        let settings = RunSettings::from_config(&cfg).unwrap();
        let mut state = SpectralState::new(&index, &params, &settings);
        state.set_initial_conditions(&[1.0, 2.0]).unwrap();
        state.reset_to_initial_condition();
        let d = Density::gaussian(0.0, 1.0, 0).unwrap();
        let s = viscous_divergence_correction(&state, &[d, d.with_mode(1)], 0.5).unwrap();
        assert!((s - (-2.5 + 2.0 + 8.5)).abs() < 1e-12, "S = {s}");
    }

    #[test]
    fn test_densities_expanded_per_mode() {
        let ctx = RunContext::new(config(2)).unwrap();
        let mc = MonteCarloClosure::from_context(&ctx).unwrap();
        let d = mc.densities();
        assert_eq!(d.len(), 3);
        assert_eq!(d[1].mean(), 0.5);
        assert_eq!(d[1].mode(), 1);
        assert_eq!(d[2].std_dev(), 0.05);
    }

    #[test]
    fn test_missing_mode_zero_density_rejected() {
        let mut c = config(2);
        c.densities.remove(0);
        let ctx = RunContext::new(c).unwrap();
        assert!(MonteCarloClosure::from_context(&ctx).is_err());
    }

    #[test]
    fn test_records_carry_final_means() {
        let mut sink = MemorySink::new();
        let summary = run_problem(config(4), &mut sink).unwrap();
        assert_eq!(summary.passes, 4);
        assert_eq!(sink.len(), 3, "records are written in the last run only");
        for r in sink.records() {
            let f = r.feedback.as_ref().unwrap();
            assert_eq!(f.len(), 2);
            assert!(f.iter().all(|v| v.is_finite()), "non-finite mean {f:?}");
        }
    }

    #[test]
    fn test_same_seed_reproduces_means() {
        let mut a = MemorySink::new();
        let mut b = MemorySink::new();
        run_problem(config(3), &mut a).unwrap();
        run_problem(config(3), &mut b).unwrap();
        assert_eq!(a.records(), b.records());
        let mut c = config(3);
        c.random_seed = 12;
        let mut other = MemorySink::new();
        run_problem(c, &mut other).unwrap();
        assert_ne!(a.records()[0].modes, other.records()[0].modes);
    }

    #[test]
    fn test_restart_at_pass_zero_discards_old_means() {
        let ctx = RunContext::new(config(2)).unwrap();
        let rng = RandomSource::new(5);
        let mut mc = MonteCarloClosure::from_context(&ctx).unwrap();
        let mut ens = mc.build_ensemble(&ctx).unwrap();
        for pass in 0..2 {
            mc.prepare_pass(pass, &mut ens, &ctx, &rng).unwrap();
            mc.accumulate(0, &ens, &ctx).unwrap();
        }
        mc.prepare_pass(0, &mut ens, &ctx, &rng).unwrap();
        let sample = -ens[0].resolved_feedback(0).unwrap() * mc.correction;
        mc.accumulate(0, &ens, &ctx).unwrap();
        assert_eq!(mc.means[0][0].count(), 1);
        assert_eq!(mc.means_at(0).unwrap()[0], sample);
        assert_eq!(mc.means[1][0].count(), 0);
    }

    #[test]
    fn test_finished_problem_refuses_second_run() {
        let ctx = RunContext::new(config(4)).unwrap();
        let mut problem = crate::problem::Problem::new(&ctx).unwrap();
        let mut first = MemorySink::new();
        problem.run(&RandomSource::new(1), &mut first).unwrap();
        let mut again = MemorySink::new();
        let err = problem.run(&RandomSource::new(2), &mut again).unwrap_err();
        assert!(matches!(err, OpbeError::Sequence(_)), "got {err}");
        assert!(again.is_empty());

        let fresh_ctx = RunContext::new(config(4)).unwrap();
        let mut fresh = crate::problem::Problem::new(&fresh_ctx).unwrap();
        let mut fresh_sink = MemorySink::new();
        fresh.run(&RandomSource::new(1), &mut fresh_sink).unwrap();
        assert_eq!(first.records(), fresh_sink.records());
    }

    #[test]
    fn test_manual_passes_match_running_mean() {
        let ctx = RunContext::new(config(2)).unwrap();
        let rng = RandomSource::new(5);
        let mut mc = MonteCarloClosure::from_context(&ctx).unwrap();
        let mut ens = mc.build_ensemble(&ctx).unwrap();
        let mut samples = Vec::new();
        for pass in 0..2 {
            mc.prepare_pass(pass, &mut ens, &ctx, &rng).unwrap();
            let s = -ens[0].resolved_feedback(0).unwrap() * mc.correction;
            samples.push(s);
            mc.accumulate(0, &ens, &ctx).unwrap();
        }
        let mean = mc.means_at(0).unwrap()[0];
        let expected = 0.5 * samples[0] + 0.5 * samples[1];
        assert!((mean - expected).abs() < 1e-12 * (1.0 + expected.abs()), "{mean} vs {expected}");
    }
}
