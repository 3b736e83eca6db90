// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Adaptive Runge-Kutta Integrator
// ─────────────────────────────────────────────────────────────────────
//! Embedded Runge-Kutta pairs with local error control.
//!
//! Per step the 5th-order solution is propagated and the difference to
//! the embedded 4th-order solution is the error estimate. With
//!
//!   D_i = eps_abs + eps_rel·|y_i|,   r = max_i |err_i| / D_i
//!
//! a step is rejected when r > 1.1 (h ← h·max(0.9·r^(-1/4), 0.2)) and
//! the next step grows when r < 0.5 (h ← h·min(0.9·r^(-1/5), 5)).
//! The last step of an `apply` call is clipped onto the target time.
//!
//! Lifecycle: `allocate` → any number of `apply` → `free`.

use serde::{Deserialize, Serialize};

use opbe_types::config::IntegratorConfig;
use opbe_types::{OpbeError, OpbeResult};

const STAGES: usize = 6;
const REJECT_RATIO: f64 = 1.1;
const GROW_RATIO: f64 = 0.5;
const SAFETY: f64 = 0.9;
const MAX_SHRINK: f64 = 0.2;
const MAX_GROWTH: f64 = 5.0;
const STEP_UNDERFLOW: f64 = 1e-14;

/// Which embedded pair to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepperKind {
    /// Runge-Kutta-Fehlberg 4(5).
    Rkf45,
    /// Cash-Karp 4(5).
    CashKarp,
}

impl StepperKind {
    pub fn from_name(name: &str) -> OpbeResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rkf45" => Ok(StepperKind::Rkf45),
            "rkck" => Ok(StepperKind::CashKarp),
            other => Err(OpbeError::Config(format!(
                "unknown solver '{other}', expected rkf45 or rkck"
            ))),
        }
    }

    fn tableau(self) -> &'static Tableau {
        match self {
            StepperKind::Rkf45 => &RKF45,
            StepperKind::CashKarp => &CASH_KARP,
        }
    }
}

/// Solver lifecycle phase of one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverPhase {
    Idle,
    Initialize,
    Run,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratorSettings {
    pub kind: StepperKind,
    pub absolute_error: f64,
    pub relative_error: f64,
    pub initial_step: f64,
    pub max_steps: usize,
}

impl IntegratorSettings {
    pub fn from_config(config: &IntegratorConfig) -> OpbeResult<Self> {
        Ok(Self {
            kind: StepperKind::from_name(&config.solver)?,
            absolute_error: config.absolute_error,
            relative_error: config.relative_error,
            initial_step: config.initial_step,
            max_steps: config.max_steps,
        })
    }
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        let config = IntegratorConfig::default();
        Self {
            kind: StepperKind::Rkf45,
            absolute_error: config.absolute_error,
            relative_error: config.relative_error,
            initial_step: config.initial_step,
            max_steps: config.max_steps,
        }
    }
}

/// Accepted and rejected step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub steps: u64,
    pub rejected: u64,
}

impl IntegrationStats {
    pub fn merge(&mut self, other: IntegrationStats) {
        self.steps += other.steps;
        self.rejected += other.rejected;
    }
}

struct Tableau {
    c: [f64; STAGES],
    a: [[f64; STAGES - 1]; STAGES],
    b5: [f64; STAGES],
    b4: [f64; STAGES],
}

static RKF45: Tableau = Tableau {
    c: [0.0, 0.25, 0.375, 12.0 / 13.0, 1.0, 0.5],
    a: [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [0.25, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0],
        [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0],
        [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0],
        [-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
    ],
    b5: [
        16.0 / 135.0,
        0.0,
        6656.0 / 12825.0,
        28561.0 / 56430.0,
        -9.0 / 50.0,
        2.0 / 55.0,
    ],
    b4: [
        25.0 / 216.0,
        0.0,
        1408.0 / 2565.0,
        2197.0 / 4104.0,
        -0.2,
        0.0,
    ],
};

static CASH_KARP: Tableau = Tableau {
    c: [0.0, 0.2, 0.3, 0.6, 1.0, 0.875],
    a: [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [0.2, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
        [0.3, -0.9, 1.2, 0.0, 0.0],
        [-11.0 / 54.0, 2.5, -70.0 / 27.0, 35.0 / 27.0, 0.0],
        [
            1631.0 / 55296.0,
            175.0 / 512.0,
            575.0 / 13824.0,
            44275.0 / 110592.0,
            253.0 / 4096.0,
        ],
    ],
    b5: [
        37.0 / 378.0,
        0.0,
        250.0 / 621.0,
        125.0 / 594.0,
        0.0,
        512.0 / 1771.0,
    ],
    b4: [
        2825.0 / 27648.0,
        0.0,
        18575.0 / 48384.0,
        13525.0 / 55296.0,
        277.0 / 14336.0,
        0.25,
    ],
};

/// One integrator lane. Keeps its adaptive step size across `apply` calls.
pub struct OdeIntegrator {
    settings: IntegratorSettings,
    h: f64,
    dim: Option<usize>,
    // Scratch, sized by `allocate`
    k: Vec<Vec<f64>>,
    y_stage: Vec<f64>,
    y_next: Vec<f64>,
    y_err: Vec<f64>,
}

impl OdeIntegrator {
    pub fn new(settings: IntegratorSettings) -> Self {
        let h = settings.initial_step;
        Self {
            settings,
            h,
            dim: None,
            k: Vec::new(),
            y_stage: Vec::new(),
            y_next: Vec::new(),
            y_err: Vec::new(),
        }
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    pub fn is_allocated(&self) -> bool {
        self.dim.is_some()
    }

    /// Current trial step size.
    pub fn step_size(&self) -> f64 {
        self.h
    }

    pub fn allocate(&mut self, dim: usize) {
        self.k = vec![vec![0.0; dim]; STAGES];
        self.y_stage = vec![0.0; dim];
        self.y_next = vec![0.0; dim];
        self.y_err = vec![0.0; dim];
        self.dim = Some(dim);
        self.reset_step();
    }

    pub fn free(&mut self) {
        self.k = Vec::new();
        self.y_stage = Vec::new();
        self.y_next = Vec::new();
        self.y_err = Vec::new();
        self.dim = None;
    }

    /// Forget the adapted step size.
    pub fn reset_step(&mut self) {
        self.h = self.settings.initial_step;
    }

    /// Advance `(t, y)` to exactly `t1`.
    ///
    /// On error `t` and `y` may hold an intermediate accepted state; the
    /// caller restores its own snapshot.
    pub fn apply<F>(&mut self, t: &mut f64, t1: f64, y: &mut [f64], mut rhs: F) -> OpbeResult<IntegrationStats>
    where
        F: FnMut(f64, &[f64], &mut [f64]) -> OpbeResult<()>,
    {
        match self.dim {
            None => {
                return Err(OpbeError::Sequence(
                    "integrator: apply called before allocate".to_string(),
                ))
            }
            Some(dim) if dim != y.len() => {
                return Err(OpbeError::Sequence(format!(
                    "integrator: allocated for {dim} components, got {}",
                    y.len()
                )))
            }
            Some(_) => {}
        }
        if t1 < *t {
            return Err(OpbeError::Sequence(format!(
                "integrator: target time {t1} is before current time {}",
                *t
            )));
        }

        let mut stats = IntegrationStats::default();
        let mut h = self.h;
        while *t < t1 {
            if (stats.steps + stats.rejected) as usize >= self.settings.max_steps {
                return Err(OpbeError::Numerical(format!(
                    "integrator: step budget {} exhausted at t={}",
                    self.settings.max_steps, *t
                )));
            }
            let remaining = t1 - *t;
            let clipped = h >= remaining;
            let h_try = if clipped { remaining } else { h };

            self.trial_step(*t, h_try, y, &mut rhs)?;
            let ratio = self.error_ratio(y);

            if !ratio.is_finite() || ratio > REJECT_RATIO {
                stats.rejected += 1;
                let factor = if ratio.is_finite() {
                    (SAFETY * ratio.powf(-0.25)).max(MAX_SHRINK)
                } else {
                    MAX_SHRINK
                };
                h = h_try * factor;
                if h.abs() < STEP_UNDERFLOW * (1.0 + t.abs()) {
                    return Err(OpbeError::Numerical(format!(
                        "integrator: step size underflow ({h:e}) at t={}",
                        *t
                    )));
                }
                continue;
            }

            y.copy_from_slice(&self.y_next);
            *t = if clipped { t1 } else { *t + h_try };
            stats.steps += 1;

            let suggested = if ratio < GROW_RATIO {
                let factor = if ratio > 0.0 {
                    (SAFETY * ratio.powf(-0.2)).min(MAX_GROWTH)
                } else {
                    MAX_GROWTH
                };
                h_try * factor
            } else {
                h_try
            };
            // A clipped step says nothing about the usable step size.
            h = if clipped { h.max(suggested) } else { suggested };
        }
        self.h = h;
        Ok(stats)
    }

    fn trial_step<F>(&mut self, t: f64, h: f64, y: &[f64], rhs: &mut F) -> OpbeResult<()>
    where
        F: FnMut(f64, &[f64], &mut [f64]) -> OpbeResult<()>,
    {
        let tab = self.settings.kind.tableau();
        rhs(t, y, &mut self.k[0])?;
        for s in 1..STAGES {
            for i in 0..y.len() {
                let mut acc = 0.0;
                for (j, a) in tab.a[s][..s].iter().enumerate() {
                    acc += a * self.k[j][i];
                }
                self.y_stage[i] = y[i] + h * acc;
            }
            rhs(t + tab.c[s] * h, &self.y_stage, &mut self.k[s])?;
        }
        for i in 0..y.len() {
            let mut high = 0.0;
            let mut diff = 0.0;
            for s in 0..STAGES {
                high += tab.b5[s] * self.k[s][i];
                diff += (tab.b5[s] - tab.b4[s]) * self.k[s][i];
            }
            self.y_next[i] = y[i] + h * high;
            self.y_err[i] = h * diff;
        }
        Ok(())
    }

    fn error_ratio(&self, y: &[f64]) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..y.len() {
            if !self.y_next[i].is_finite() || !self.y_err[i].is_finite() {
                return f64::INFINITY;
            }
            let d = self.settings.absolute_error + self.settings.relative_error * y[i].abs();
            let e = self.y_err[i].abs();
            let r = if d > 0.0 {
                e / d
            } else if e == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            worst = worst.max(r);
        }
        worst
    }
}

impl std::fmt::Debug for OdeIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdeIntegrator")
            .field("kind", &self.settings.kind)
            .field("h", &self.h)
            .field("dim", &self.dim)
            .finish()
    }
}
