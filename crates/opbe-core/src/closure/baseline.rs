// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — No-Closure Baseline
// ─────────────────────────────────────────────────────────────────────
//! Single deterministic trajectory, no feedback estimate. Reference
//! for the bare dynamics.

use opbe_physics::SpectralState;
use opbe_types::OpbeResult;

use crate::context::RunContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoClosure;

impl NoClosure {
    pub fn build_ensemble<'a>(&self, ctx: &'a RunContext) -> OpbeResult<Vec<SpectralState<'a>>> {
        Ok(vec![ctx.new_state()?])
    }
}
