// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Output Records
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// Everything emitted at one scheduled output time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub time: f64,
    /// Mode amplitudes, one vector per ensemble member.
    pub modes: Vec<Vec<f64>>,
    /// `(1/2π)·Σ u_k²` over all modes of the reference state.
    pub energy_total: f64,
    /// Same sum restricted to the resolved modes.
    pub energy_resolved: f64,
    /// `(1/π)·Σ u_k^m` for m = 1..=10.
    pub moments: Vec<f64>,
    /// Per-resolved-mode memory-kernel estimate F(t).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<f64>>,
    /// Hermite coefficients `[mode][rank]`, quadrature closure only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projections: Option<Vec<Vec<f64>>>,
    /// RHS of the reference state with the t-model switched on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_model_rhs: Option<Vec<f64>>,
}

/// Totals returned by a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records_written: usize,
    pub passes: usize,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub final_time: f64,
}
