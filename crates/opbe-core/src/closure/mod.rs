// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Closure Strategies
// ─────────────────────────────────────────────────────────────────────
//! Four estimators of the same memory-kernel term F(t), one per
//! resolved mode. They share the ensemble machinery and differ in how
//! the ensemble is built and how the estimate is formed:
//!
//! | strategy          | ensemble                         | estimate                       |
//! |-------------------|----------------------------------|--------------------------------|
//! | quadrature        | one state per grid node          | trapezoid of mode × density    |
//! | monte-carlo       | one state, `num_runs` passes     | running mean of −feedback·S    |
//! | finite-difference | base + two perturbed states      | directional derivative         |
//! | no-closure        | one state                        | none                           |

pub mod baseline;
pub mod finite_difference;
pub mod monte_carlo;
pub mod quadrature;

use opbe_physics::{RandomSource, SpectralState};
use opbe_types::{ClosureConfig, OpbeError, OpbeResult, OutputRecord};

use crate::context::RunContext;

pub use baseline::NoClosure;
pub use finite_difference::FiniteDifferenceClosure;
pub use monte_carlo::{MonteCarloClosure, RunningMean};
pub use quadrature::QuadratureClosure;

/// Per-step result of a strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Estimate {
    pub feedback: Option<Vec<f64>>,
    pub projections: Option<Vec<Vec<f64>>>,
}

impl Estimate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn feedback(values: Vec<f64>) -> Self {
        Self {
            feedback: Some(values),
            projections: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClosureStrategy {
    Quadrature(QuadratureClosure),
    MonteCarlo(MonteCarloClosure),
    FiniteDifference(FiniteDifferenceClosure),
    NoClosure(NoClosure),
}

impl ClosureStrategy {
    pub fn from_context(ctx: &RunContext) -> OpbeResult<Self> {
        Ok(match &ctx.config.closure {
            ClosureConfig::Quadrature { .. } => Self::Quadrature(QuadratureClosure::from_context(ctx)?),
            ClosureConfig::MonteCarlo { .. } => Self::MonteCarlo(MonteCarloClosure::from_context(ctx)?),
            ClosureConfig::FiniteDifference { .. } => {
                Self::FiniteDifference(FiniteDifferenceClosure::from_context(ctx)?)
            }
            ClosureConfig::NoClosure => Self::NoClosure(NoClosure),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Quadrature(_) => "quadrature",
            Self::MonteCarlo(_) => "monte-carlo",
            Self::FiniteDifference(_) => "finite-difference",
            Self::NoClosure(_) => "no-closure",
        }
    }

    /// How many full trajectories the run makes. Records come from the last.
    pub fn num_passes(&self) -> usize {
        match self {
            Self::MonteCarlo(mc) => mc.num_runs(),
            _ => 1,
        }
    }

    pub fn build_ensemble<'a>(&self, ctx: &'a RunContext) -> OpbeResult<Vec<SpectralState<'a>>> {
        match self {
            Self::Quadrature(q) => q.build_ensemble(ctx),
            Self::MonteCarlo(mc) => mc.build_ensemble(ctx),
            Self::FiniteDifference(fd) => fd.build_ensemble(ctx),
            Self::NoClosure(nc) => nc.build_ensemble(ctx),
        }
    }

    /// Hook before each pass; only Monte-Carlo redraws initial conditions.
    pub fn prepare_pass(
        &mut self,
        pass: usize,
        ensemble: &mut [SpectralState<'_>],
        ctx: &RunContext,
        rng: &RandomSource,
    ) -> OpbeResult<()> {
        match self {
            Self::MonteCarlo(mc) => mc.prepare_pass(pass, ensemble, ctx, rng),
            _ => Ok(()),
        }
    }

    /// Estimate after every state reached output time `step`.
    pub fn advance_and_estimate(
        &mut self,
        step: usize,
        ensemble: &[SpectralState<'_>],
        ctx: &RunContext,
    ) -> OpbeResult<Estimate> {
        match self {
            Self::Quadrature(q) => q.estimate(ensemble, ctx),
            Self::MonteCarlo(mc) => mc.accumulate(step, ensemble, ctx),
            Self::FiniteDifference(fd) => fd.estimate(ensemble, ctx),
            Self::NoClosure(_) => Ok(Estimate::none()),
        }
    }

    /// Assemble the record for one output time.
    ///
    /// Energies, moments and the t-model diagnostic come from the first
    /// ensemble member; `modes` carries every member.
    pub fn finalize_output(
        &self,
        time: f64,
        ensemble: &[SpectralState<'_>],
        estimate: Estimate,
        ctx: &RunContext,
    ) -> OpbeResult<OutputRecord> {
        let reference = ensemble.first().ok_or_else(|| {
            OpbeError::Output(format!("no ensemble member to report at t = {time}"))
        })?;
        let moments = reference.moments(ctx.settings.num_moments);
        let t_model_rhs = if ctx.config.output.t_model_rhs {
            Some(reference.t_model_rhs()?)
        } else {
            None
        };
        Ok(OutputRecord {
            time,
            modes: ensemble.iter().map(|s| s.modes().to_vec()).collect(),
            energy_total: reference.energy(),
            energy_resolved: reference.resolved_energy(),
            moments: moments[1..].to_vec(),
            feedback: estimate.feedback,
            projections: estimate.projections,
            t_model_rhs,
        })
    }
}
