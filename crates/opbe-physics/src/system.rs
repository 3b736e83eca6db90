// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Truncated Spectral Burgers State
// ─────────────────────────────────────────────────────────────────────
//! One evolving copy of the mode vector ("system").
//!
//! For mode k (1-based) of N, viscosity ε:
//!
//!   u̇_k = -ε k² u_k + ½ ( k Σ_{k'=1}^{N-k} u_{k'} u_{k'+k}
//!                         - Σ_{k'=1}^{k-1} k' u_{k'} u_{k-k'} )
//!
//! With the t-model switched on, resolved modes m = 1..=R additionally get
//!
//!   w_{m''} = Σ_{m'=m''}^{N} (m''+N-m') u_{m'} u_{m''+N-m'}
//!   u̇_m   += -¼ t m Σ_{m''=1}^{m} w_{m''} u_{m''+N-m}
//!
//! The resolved feedback of mode m ≤ R is
//!
//!   F_m = ½ m Σ_{k'=R-m+1}^{N-m} u_{k'} u_{m+k'}
//!
//! Each state borrows the run's shared ModeIndex, physical parameters
//! and settings, and owns one integrator lane.

use opbe_types::{OpbeError, OpbeResult, SystemKind};

use crate::integrator::{IntegrationStats, OdeIntegrator, SolverPhase};
use crate::mode_index::ModeIndex;
use crate::params::{PhysicalParams, RunSettings, ONE_OVER_2PI, ONE_OVER_PI};

// ─── Free-standing dynamics ─────────────────────────────────────────

fn check_len(name: &str, len: usize, n: usize) -> OpbeResult<()> {
    if len < n {
        return Err(OpbeError::Index(format!(
            "{name} buffer holds {len} entries, {n} modes need writing"
        )));
    }
    Ok(())
}

/// Bare Burgers right-hand side into `out`.
pub fn burgers_rhs(u: &[f64], viscosity: f64, out: &mut [f64]) -> OpbeResult<()> {
    let n = u.len();
    check_len("rhs output", out.len(), n)?;
    for k in 1..=n {
        let mut forward = 0.0;
        for kp in 1..=n - k {
            forward += u[kp - 1] * u[kp + k - 1];
        }
        let mut backward = 0.0;
        for kp in 1..k {
            backward += kp as f64 * u[kp - 1] * u[k - kp - 1];
        }
        let kf = k as f64;
        out[k - 1] = -viscosity * kf * kf * u[k - 1] + 0.5 * (kf * forward - backward);
    }
    Ok(())
}

/// Add the t-model term for modes `1..=num_resolved` at time `t`.
///
/// `work` and `out` must hold at least `u.len()` entries.
pub fn add_t_model(
    u: &[f64],
    t: f64,
    num_resolved: usize,
    work: &mut [f64],
    out: &mut [f64],
) -> OpbeResult<()> {
    let n = u.len();
    check_len("t-model work", work.len(), n)?;
    check_len("rhs output", out.len(), n)?;
    for mpp in 1..=n {
        let mut w = 0.0;
        for mp in mpp..=n {
            w += (mpp + n - mp) as f64 * u[mp - 1] * u[mpp + n - mp - 1];
        }
        work[mpp - 1] = w;
    }
    for m in 1..=num_resolved.min(n) {
        let mut s = 0.0;
        for mpp in 1..=m {
            s += work[mpp - 1] * u[mpp + n - m - 1];
        }
        out[m - 1] -= 0.25 * t * m as f64 * s;
    }
    Ok(())
}

/// Right-hand side for `system`, including the t-model when requested.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_rhs(
    system: SystemKind,
    u: &[f64],
    viscosity: f64,
    t: f64,
    t_model: bool,
    num_resolved: usize,
    work: &mut [f64],
    out: &mut [f64],
) -> OpbeResult<()> {
    match system {
        SystemKind::Burgers => {
            burgers_rhs(u, viscosity, out)?;
            if t_model {
                add_t_model(u, t, num_resolved, work, out)?;
            }
            Ok(())
        }
        SystemKind::NavierStokes => Err(OpbeError::Config(
            "navier-stokes dynamics are not implemented".to_string(),
        )),
    }
}

/// Feedback into 0-based `slot` from pairs involving unresolved modes.
pub fn resolved_feedback(u: &[f64], num_resolved: usize, slot: usize) -> OpbeResult<f64> {
    let n = u.len();
    let m = slot + 1;
    if m > num_resolved || num_resolved > n {
        return Err(OpbeError::Index(format!(
            "resolved_feedback: mode {m} is outside the resolved range 1..={num_resolved}"
        )));
    }
    let mut sum = 0.0;
    for kp in (num_resolved - m + 1)..=(n - m) {
        sum += u[kp - 1] * u[m + kp - 1];
    }
    Ok(0.5 * m as f64 * sum)
}

// ─── SpectralState ──────────────────────────────────────────────────

/// Mode vector, its initial condition and an integrator lane.
#[derive(Debug)]
pub struct SpectralState<'a> {
    index: &'a ModeIndex,
    params: &'a PhysicalParams,
    settings: &'a RunSettings,
    modes: Vec<f64>,
    initial: Vec<f64>,
    time: f64,
    phase: SolverPhase,
    integrator: OdeIntegrator,
    work: Vec<f64>,
    stats: IntegrationStats,
}

impl<'a> SpectralState<'a> {
    pub fn new(index: &'a ModeIndex, params: &'a PhysicalParams, settings: &'a RunSettings) -> Self {
        let n = index.num_modes();
        Self {
            index,
            params,
            settings,
            modes: vec![0.0; n],
            initial: vec![0.0; n],
            time: settings.start_time,
            phase: SolverPhase::Idle,
            integrator: OdeIntegrator::new(settings.integrator.clone()),
            work: vec![0.0; n],
            stats: IntegrationStats::default(),
        }
    }

    /// Reallocate and zero both vectors. The size is pinned to the index.
    pub fn set_size(&mut self, num_modes: usize) -> OpbeResult<()> {
        if num_modes != self.index.num_modes() {
            return Err(OpbeError::Config(format!(
                "set_size: {num_modes} modes requested, index holds {}",
                self.index.num_modes()
            )));
        }
        self.modes = vec![0.0; num_modes];
        self.initial = vec![0.0; num_modes];
        self.work = vec![0.0; num_modes];
        Ok(())
    }

    pub fn index(&self) -> &'a ModeIndex {
        self.index
    }

    pub fn params(&self) -> &'a PhysicalParams {
        self.params
    }

    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }

    pub fn modes(&self) -> &[f64] {
        &self.modes
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    /// Amplitude of 1-based wavenumber `k`.
    pub fn u(&self, k: usize) -> OpbeResult<f64> {
        Ok(self.modes[self.index.checked_slot(k)?])
    }

    pub fn u3(&self, i: usize, j: usize, k: usize) -> OpbeResult<f64> {
        Ok(self.modes[self.index.checked_slot3(i, j, k)?])
    }

    // ── Initial conditions ──────────────────────────────────────────

    pub fn set_initial_condition(&mut self, slot: usize, value: f64) -> OpbeResult<()> {
        let n = self.initial.len();
        let entry = self.initial.get_mut(slot).ok_or_else(|| {
            OpbeError::Index(format!("set_initial_condition: slot {slot} outside 0..{n}"))
        })?;
        *entry = value;
        Ok(())
    }

    pub fn set_initial_conditions(&mut self, values: &[f64]) -> OpbeResult<()> {
        if values.len() != self.initial.len() {
            return Err(OpbeError::Config(format!(
                "set_initial_conditions: {} values for {} modes",
                values.len(),
                self.initial.len()
            )));
        }
        self.initial.copy_from_slice(values);
        Ok(())
    }

    pub fn initial_condition(&self, slot: usize) -> OpbeResult<f64> {
        self.initial.get(slot).copied().ok_or_else(|| {
            OpbeError::Index(format!(
                "initial_condition: slot {slot} outside 0..{}",
                self.initial.len()
            ))
        })
    }

    pub fn initial_conditions(&self) -> &[f64] {
        &self.initial
    }

    /// Copy the initial condition into the live vector and rewind to the run start.
    pub fn reset_to_initial_condition(&mut self) {
        self.modes.copy_from_slice(&self.initial);
        self.time = self.settings.start_time;
        self.integrator.reset_step();
    }

    // ── Solver lifecycle ────────────────────────────────────────────

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SolverPhase) {
        self.phase = phase;
    }

    pub fn initialize_solver(&mut self) -> OpbeResult<()> {
        self.require_phase(SolverPhase::Initialize, "initialize_solver")?;
        if let SystemKind::NavierStokes = self.settings.system {
            return Err(OpbeError::Config(
                "navier-stokes dynamics are not implemented".to_string(),
            ));
        }
        self.integrator.allocate(self.modes.len());
        self.stats = IntegrationStats::default();
        Ok(())
    }

    pub fn clean_up_solver(&mut self) -> OpbeResult<()> {
        self.require_phase(SolverPhase::Stop, "clean_up_solver")?;
        self.integrator.free();
        Ok(())
    }

    fn require_phase(&self, expected: SolverPhase, op: &str) -> OpbeResult<()> {
        if self.phase != expected {
            return Err(OpbeError::Sequence(format!(
                "{op} requires phase {expected:?}, state is in {:?}",
                self.phase
            )));
        }
        Ok(())
    }

    /// Advance to `target` exactly. On failure the state is left untouched.
    pub fn evolve(&mut self, target: f64) -> OpbeResult<IntegrationStats> {
        self.require_phase(SolverPhase::Run, "evolve")?;
        let snapshot_modes = self.modes.clone();
        let snapshot_time = self.time;

        let system = self.settings.system;
        let t_model = self.settings.t_model;
        let viscosity = self.params.viscosity;
        let num_resolved = self.index.num_resolved();
        let work = &mut self.work;
        let result = self.integrator.apply(&mut self.time, target, &mut self.modes, |t, y, out| {
            evaluate_rhs(system, y, viscosity, t, t_model, num_resolved, &mut work[..], out)
        });

        match result {
            Ok(stats) => {
                if stats.rejected > stats.steps {
                    log::warn!(
                        "evolve to t={target}: {} rejected vs {} accepted steps",
                        stats.rejected,
                        stats.steps
                    );
                }
                self.stats.merge(stats);
                Ok(stats)
            }
            Err(e) => {
                self.modes = snapshot_modes;
                self.time = snapshot_time;
                Err(e)
            }
        }
    }

    // ── Dynamics at the current state ───────────────────────────────

    /// RHS at the current state and time, t-model per run settings.
    pub fn compute_rhs(&self) -> OpbeResult<Vec<f64>> {
        self.rhs_with(self.settings.t_model)
    }

    /// RHS with the t-model forced on.
    pub fn t_model_rhs(&self) -> OpbeResult<Vec<f64>> {
        self.rhs_with(true)
    }

    fn rhs_with(&self, t_model: bool) -> OpbeResult<Vec<f64>> {
        let n = self.modes.len();
        let mut out = vec![0.0; n];
        let mut work = vec![0.0; n];
        evaluate_rhs(
            self.settings.system,
            &self.modes,
            self.params.viscosity,
            self.time,
            t_model,
            self.index.num_resolved(),
            &mut work,
            &mut out,
        )?;
        Ok(out)
    }

    pub fn resolved_feedback(&self, slot: usize) -> OpbeResult<f64> {
        resolved_feedback(&self.modes, self.index.num_resolved(), slot)
    }

    pub fn resolved_feedback_3d(&self, i: usize, j: usize, k: usize) -> OpbeResult<f64> {
        Err(OpbeError::Config(format!(
            "resolved_feedback at ({i}, {j}, {k}): tensor-indexed feedback is not implemented"
        )))
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    pub fn sqr_norm(&self, up_to: usize) -> f64 {
        self.modes[..up_to.min(self.modes.len())]
            .iter()
            .map(|u| u * u)
            .sum()
    }

    pub fn norm(&self, up_to: usize) -> f64 {
        self.sqr_norm(up_to).sqrt()
    }

    /// `(1/2π)·Σ u_k²` over the first `up_to` slots.
    pub fn energy_up_to(&self, up_to: usize) -> f64 {
        ONE_OVER_2PI * self.sqr_norm(up_to)
    }

    pub fn energy(&self) -> f64 {
        self.energy_up_to(self.modes.len())
    }

    pub fn resolved_energy(&self) -> f64 {
        self.energy_up_to(self.index.num_resolved())
    }

    /// `[N, Σu, Σu², …, Σu^max_order]`, all scaled by 1/π.
    pub fn moments(&self, max_order: usize) -> Vec<f64> {
        let mut out = vec![0.0; max_order + 1];
        out[0] = self.modes.len() as f64;
        for &u in &self.modes {
            let mut p = 1.0;
            for m in out.iter_mut().skip(1) {
                p *= u;
                *m += p;
            }
        }
        out.iter_mut().for_each(|m| *m *= ONE_OVER_PI);
        out
    }
}
