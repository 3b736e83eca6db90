// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Problem (Evolution Orchestrator)
// ─────────────────────────────────────────────────────────────────────
//! Per run:
//!   1. Build the strategy and its ensemble from the shared context
//!   2. INITIALIZE: allocate one integrator lane per state
//!   3. For each pass (Monte-Carlo: one per run, otherwise one):
//!      a. strategy hook (fresh initial conditions for Monte-Carlo)
//!      b. reset every state to its initial condition, phase RUN
//!      c. for each output time: evolve every state to it, estimate,
//!         and on the last pass write a record
//!      d. phase STOP
//!   4. Free every lane, flush the sink
//!
//! Any error aborts the run and is logged before it is returned.

use opbe_physics::{IntegrationStats, RandomSource, SolverPhase, SpectralState};
use opbe_types::{OpbeError, OpbeResult, RunConfig, RunSummary};

use crate::closure::ClosureStrategy;
use crate::context::RunContext;
use crate::output::OutputSink;

/// Lifecycle of a `Problem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemState {
    Ready,
    Running,
    Done,
    Failed,
}

pub struct Problem<'a> {
    ctx: &'a RunContext,
    strategy: ClosureStrategy,
    ensemble: Vec<SpectralState<'a>>,
    state: ProblemState,
}

impl<'a> Problem<'a> {
    pub fn new(ctx: &'a RunContext) -> OpbeResult<Self> {
        let strategy = ClosureStrategy::from_context(ctx)?;
        let ensemble = strategy.build_ensemble(ctx)?;
        Ok(Self {
            ctx,
            strategy,
            ensemble,
            state: ProblemState::Ready,
        })
    }

    pub fn ensemble(&self) -> &[SpectralState<'a>] {
        &self.ensemble
    }

    pub fn strategy(&self) -> &ClosureStrategy {
        &self.strategy
    }

    pub fn state(&self) -> ProblemState {
        self.state
    }

    /// Run every pass once. A `Problem` runs only from `Ready`; build a
    /// new one to run again.
    ///
    /// Records are written to `sink` as each output time completes, so a
    /// failure part-way through the last pass leaves the records written
    /// so far in the sink.
    pub fn run(&mut self, rng: &RandomSource, sink: &mut dyn OutputSink) -> OpbeResult<RunSummary> {
        if self.state != ProblemState::Ready {
            return Err(OpbeError::Sequence(format!(
                "problem already ran (state {:?})",
                self.state
            )));
        }
        self.state = ProblemState::Running;
        log::info!(
            "run start: {} closure, {} modes ({} resolved), Re = {:.4}, seed {}, {} states, {} output times",
            self.strategy.name(),
            self.ctx.num_modes(),
            self.ctx.num_resolved(),
            self.ctx.params.reynolds_number(),
            rng.seed(),
            self.ensemble.len(),
            self.ctx.schedule.len()
        );
        match self.run_passes(rng, sink) {
            Ok(summary) => {
                self.state = ProblemState::Done;
                log::info!(
                    "run done: {} records, {} passes, {} steps ({} rejected)",
                    summary.records_written,
                    summary.passes,
                    summary.accepted_steps,
                    summary.rejected_steps
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = ProblemState::Failed;
                log::error!("run failed ({} closure): {e}", self.strategy.name());
                Err(e)
            }
        }
    }

    fn run_passes(&mut self, rng: &RandomSource, sink: &mut dyn OutputSink) -> OpbeResult<RunSummary> {
        let ctx = self.ctx;
        for s in self.ensemble.iter_mut() {
            s.set_phase(SolverPhase::Initialize);
            s.initialize_solver()?;
        }

        let passes = self.strategy.num_passes();
        let mut records_written = 0;
        for pass in 0..passes {
            let last_pass = pass + 1 == passes;
            self.strategy.prepare_pass(pass, &mut self.ensemble, ctx, rng)?;
            for s in self.ensemble.iter_mut() {
                s.reset_to_initial_condition();
                s.set_phase(SolverPhase::Run);
            }

            for (step, &t) in ctx.schedule.times().iter().enumerate() {
                for s in self.ensemble.iter_mut() {
                    s.evolve(t)?;
                }
                let estimate = self.strategy.advance_and_estimate(step, &self.ensemble, ctx)?;
                if last_pass {
                    if ctx.config.output.print_output_time {
                        log::debug!("output time {t}");
                    }
                    let record = self.strategy.finalize_output(t, &self.ensemble, estimate, ctx)?;
                    sink.write(&record)?;
                    records_written += 1;
                }
            }

            for s in self.ensemble.iter_mut() {
                s.set_phase(SolverPhase::Stop);
            }
        }

        let mut totals = IntegrationStats::default();
        for s in self.ensemble.iter_mut() {
            s.clean_up_solver()?;
            totals.merge(s.stats());
        }
        sink.flush()?;

        Ok(RunSummary {
            records_written,
            passes,
            accepted_steps: totals.steps,
            rejected_steps: totals.rejected,
            final_time: ctx.schedule.end(),
        })
    }
}

/// Validate `config`, run it with a generator seeded from `random_seed`,
/// and write every record to `sink`.
pub fn run_problem(config: RunConfig, sink: &mut dyn OutputSink) -> OpbeResult<RunSummary> {
    let rng = RandomSource::new(config.random_seed);
    let ctx = RunContext::new(config)?;
    let mut problem = Problem::new(&ctx)?;
    problem.run(&rng, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use opbe_physics::params::ONE_OVER_2PI;
    use opbe_types::{ClosureConfig, OutputRecord};

    fn no_closure() -> RunConfig {
        let mut c = RunConfig::new(4, 0.1, 0.0, 0.5, ClosureConfig::NoClosure);
        c.initial_conditions = vec![1.0, 0.5, 0.25, 0.125];
        c
    }

    #[test]
    fn test_no_closure_single_output_time() {
        let mut sink = MemorySink::new();
        let summary = run_problem(no_closure(), &mut sink).unwrap();
        assert_eq!(summary.records_written, 1);
        assert_eq!(sink.len(), 1);
        let r = &sink.records()[0];
        assert_eq!(r.time, 0.5);
        assert_eq!(r.modes.len(), 1);
        let expected: f64 = ONE_OVER_2PI * r.modes[0].iter().map(|u| u * u).sum::<f64>();
        assert!((r.energy_total - expected).abs() < 1e-14, "{} vs {expected}", r.energy_total);
        assert_eq!(r.energy_total, r.energy_resolved);
        assert_eq!(r.moments.len(), 10);
        assert!(r.feedback.is_none());
        assert!(r.t_model_rhs.is_none());
        assert!(summary.accepted_steps > 0);
    }

    #[test]
    fn test_states_move_in_lock_step() {
        let ctx = RunContext::new(no_closure()).unwrap();
        let mut problem = Problem::new(&ctx).unwrap();
        assert_eq!(problem.state(), ProblemState::Ready);
        let rng = RandomSource::new(0);
        let mut sink = MemorySink::new();
        problem.run(&rng, &mut sink).unwrap();
        assert_eq!(problem.state(), ProblemState::Done);
        for s in problem.ensemble() {
            assert_eq!(s.time(), 0.5);
            assert_eq!(s.phase(), SolverPhase::Stop);
        }
    }

    #[test]
    fn test_second_run_is_sequence_error() {
        let ctx = RunContext::new(no_closure()).unwrap();
        let mut problem = Problem::new(&ctx).unwrap();
        let mut sink = MemorySink::new();
        problem.run(&RandomSource::new(0), &mut sink).unwrap();
        let err = problem.run(&RandomSource::new(1), &mut sink).unwrap_err();
        assert!(matches!(err, OpbeError::Sequence(_)), "got {err}");
        assert_eq!(problem.state(), ProblemState::Done);
        assert_eq!(sink.len(), 1);
    }

    struct FailAfter {
        inner: MemorySink,
        limit: usize,
    }

    impl OutputSink for FailAfter {
        fn write(&mut self, record: &OutputRecord) -> OpbeResult<()> {
            if self.inner.len() == self.limit {
                return Err(OpbeError::Output("sink full".to_string()));
            }
            self.inner.write(record)
        }
    }

    #[test]
    fn test_failure_mid_run_keeps_streamed_records() {
        let mut c = no_closure();
        c.output.time_step = Some(0.125);
        let ctx = RunContext::new(c).unwrap();
        let mut problem = Problem::new(&ctx).unwrap();
        let mut sink = FailAfter {
            inner: MemorySink::new(),
            limit: 2,
        };
        let err = problem.run(&RandomSource::new(0), &mut sink).unwrap_err();
        assert!(matches!(err, OpbeError::Output(_)), "got {err}");
        assert_eq!(problem.state(), ProblemState::Failed);
        let times: Vec<f64> = sink.inner.records().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0.0, 0.125]);
    }

    #[test]
    fn test_energy_decays_without_forcing() {
        let mut c = no_closure();
        c.output.time_step = Some(0.25);
        let mut sink = MemorySink::new();
        run_problem(c, &mut sink).unwrap();
        let e: Vec<f64> = sink.records().iter().map(|r| r.energy_total).collect();
        assert_eq!(e.len(), 3);
        assert!(e[1] < e[0] && e[2] < e[1], "energy not decaying: {e:?}");
    }

    #[test]
    fn test_t_model_rhs_emitted_when_requested() {
        let mut c = no_closure();
        c.output.t_model_rhs = true;
        c.num_resolved = Some(3);
        let mut sink = MemorySink::new();
        run_problem(c, &mut sink).unwrap();
        let r: &OutputRecord = &sink.records()[0];
        assert_eq!(r.t_model_rhs.as_ref().map(Vec::len), Some(4));
        assert!(r.energy_resolved < r.energy_total);
    }

    #[test]
    fn test_t_model_run_differs_from_bare_run() {
        let mut bare = MemorySink::new();
        let mut corrected = MemorySink::new();
        run_problem(no_closure(), &mut bare).unwrap();
        let mut c = no_closure();
        c.t_model = true;
        run_problem(c, &mut corrected).unwrap();
        assert_ne!(bare.records()[0].modes, corrected.records()[0].modes);
    }

    #[test]
    fn test_invalid_config_fails_before_output() {
        let mut c = no_closure();
        c.viscosity = -1.0;
        let mut sink = MemorySink::new();
        assert!(matches!(run_problem(c, &mut sink), Err(OpbeError::Config(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_integrator_failure_marks_problem_failed() {
        let mut c = no_closure();
        c.integrator.max_steps = 1;
        c.integrator.initial_step = 1e-6;
        let ctx = RunContext::new(c).unwrap();
        let mut problem = Problem::new(&ctx).unwrap();
        let mut sink = MemorySink::new();
        let err = problem.run(&RandomSource::new(0), &mut sink).unwrap_err();
        assert!(matches!(err, OpbeError::Numerical(_)), "got {err}");
        assert_eq!(problem.state(), ProblemState::Failed);
        assert!(sink.is_empty());
        assert!(matches!(
            problem.run(&RandomSource::new(0), &mut sink),
            Err(OpbeError::Sequence(_))
        ));
    }

    #[test]
    fn test_json_config_end_to_end() {
        let json = r#"{
            "viscosity": 0.1,
            "start_time": 0.0,
            "end_time": 0.3,
            "mode_shape": [4, 0, 0],
            "initial_conditions": [1.0, 0.5],
            "integrator": {"solver": "rkck"},
            "output": {"times": [0.1, 0.2]},
            "closure": {"kind": "no-closure"}
        }"#;
        let mut sink = MemorySink::new();
        run_problem(RunConfig::from_json(json).unwrap(), &mut sink).unwrap();
        let times: Vec<f64> = sink.records().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0.1, 0.2, 0.3]);
    }
}
