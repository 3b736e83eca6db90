// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Quadrature Averaging Closure
// ─────────────────────────────────────────────────────────────────────
//! One state per node of a uniform grid over the single unresolved
//! mode's initial value. The grid spans the domain where that mode's
//! density exceeds the quadrature tolerance. After each step, per
//! resolved mode i,
//!
//!   F_i = Σ_j w_j · u_i^{(j)}(t) · ρ(x_j)
//!
//! with trapezoidal weights (½ at both ends) times the grid spacing.
//!
//! Optionally the mode values across the grid are projected onto a
//! Hermite basis orthonormal for ρ. The basis's own orthonormality grid
//! is built once; a quadrature grid narrower than it is logged.

use opbe_physics::params::DEFAULT_HERMITE_TOLERANCE;
use opbe_physics::{trapezoid, Density, HermiteBasis, SpectralState, UniformGrid};
use opbe_types::{ClosureConfig, OpbeError, OpbeResult};

use crate::closure::Estimate;
use crate::context::RunContext;

const FIXED_SPACING: &str = "fixedspacing";
const UNSUPPORTED_TYPES: [&str; 2] = ["adaptive", "montecarlo"];

/// `∫ f(x) w(x) dx` by the trapezoidal rule on `grid`.
pub fn weighted_trapezoid<W>(grid: &UniformGrid, values: &[f64], weight: W) -> OpbeResult<f64>
where
    W: Fn(f64) -> f64,
{
    if values.len() != grid.len {
        return Err(OpbeError::Config(format!(
            "quadrature: {} values for a {}-point grid",
            values.len(),
            grid.len
        )));
    }
    let samples: Vec<f64> = grid
        .points()
        .zip(values)
        .map(|(x, v)| v * weight(x))
        .collect();
    trapezoid(grid.spacing, &samples)
}

#[derive(Debug, Clone)]
pub struct QuadratureClosure {
    density: Density,
    grid: UniformGrid,
    hermite: Option<HermiteBasis>,
    hermite_grid: Option<UniformGrid>,
}

impl QuadratureClosure {
    pub fn from_context(ctx: &RunContext) -> OpbeResult<Self> {
        let ClosureConfig::Quadrature {
            quadrature_type,
            num_points,
            tolerance,
            hermite_rank,
        } = &ctx.config.closure
        else {
            return Err(OpbeError::Config(
                "quadrature closure built from a different closure config".to_string(),
            ));
        };

        let kind = quadrature_type.to_ascii_lowercase();
        if UNSUPPORTED_TYPES.contains(&kind.as_str()) {
            return Err(OpbeError::Config(format!(
                "quadrature type '{quadrature_type}' is not supported, use '{FIXED_SPACING}'"
            )));
        }
        if kind != FIXED_SPACING {
            return Err(OpbeError::Config(format!(
                "unknown quadrature type '{quadrature_type}'"
            )));
        }

        let unresolved = ctx.index.num_unresolved();
        if unresolved != 1 {
            return Err(OpbeError::Config(format!(
                "quadrature closure needs exactly 1 unresolved mode, got {unresolved}"
            )));
        }
        let slot = ctx.num_modes() - 1;
        let density = ctx
            .densities
            .iter()
            .find(|d| d.mode() == slot)
            .copied()
            .ok_or_else(|| {
                OpbeError::Config(format!(
                    "quadrature closure needs a density for unresolved slot {slot}"
                ))
            })?;

        let (lo, hi) = density.domain_bounds(*tolerance)?;
        let grid = UniformGrid::new(lo, hi, *num_points)?;
        let hermite = hermite_rank
            .map(|rank| HermiteBasis::new(density, rank))
            .transpose()?;
        let hermite_grid = hermite
            .as_ref()
            .map(|basis| basis.make_grid(DEFAULT_HERMITE_TOLERANCE))
            .transpose()?;
        if let Some(reference) = &hermite_grid {
            if grid.start > reference.start || grid.end() < reference.end() {
                log::warn!(
                    "quadrature grid [{lo:.4}, {hi:.4}] is narrower than the hermite grid [{:.4}, {:.4}]",
                    reference.start,
                    reference.end()
                );
            }
        }

        log::debug!(
            "quadrature: {} nodes on [{lo:.4}, {hi:.4}] for slot {slot}",
            grid.len
        );
        Ok(Self {
            density,
            grid,
            hermite,
            hermite_grid,
        })
    }

    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    pub fn density(&self) -> &Density {
        &self.density
    }

    /// Grid on which the projection basis is orthonormal, when projecting.
    pub fn hermite_grid(&self) -> Option<&UniformGrid> {
        self.hermite_grid.as_ref()
    }

    pub fn build_ensemble<'a>(&self, ctx: &'a RunContext) -> OpbeResult<Vec<SpectralState<'a>>> {
        let slot = ctx.num_modes() - 1;
        let mut ensemble = Vec::with_capacity(self.grid.len);
        for x in self.grid.points() {
            let mut state = ctx.new_state()?;
            state.set_initial_condition(slot, x)?;
            state.reset_to_initial_condition();
            ensemble.push(state);
        }
        Ok(ensemble)
    }

    pub fn estimate(&self, ensemble: &[SpectralState<'_>], ctx: &RunContext) -> OpbeResult<Estimate> {
        if ensemble.len() != self.grid.len {
            return Err(OpbeError::Config(format!(
                "quadrature: ensemble of {} states for {} nodes",
                ensemble.len(),
                self.grid.len
            )));
        }
        let resolved = ctx.num_resolved();
        let mut feedback = Vec::with_capacity(resolved);
        let mut projections = self.hermite.as_ref().map(|_| Vec::with_capacity(resolved));
        for i in 0..resolved {
            let values: Vec<f64> = ensemble.iter().map(|s| s.modes()[i]).collect();
            feedback.push(weighted_trapezoid(&self.grid, &values, |x| self.density.value(x))?);
            if let (Some(basis), Some(out)) = (&self.hermite, projections.as_mut()) {
                out.push(basis.project(&values, &self.grid)?);
            }
        }
        Ok(Estimate {
            feedback: Some(feedback),
            projections,
        })
    }
}
