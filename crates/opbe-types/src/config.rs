// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Run Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{OpbeError, OpbeResult};

pub const DEFAULT_SOLVER: &str = "rkf45";
pub const DEFAULT_LOCAL_ABSOLUTE_ERROR: f64 = 1e-6;
pub const DEFAULT_LOCAL_RELATIVE_ERROR: f64 = 0.0;
pub const DEFAULT_TIME_STEP: f64 = 1e-3;
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;
pub const DEFAULT_QUADRATURE_TYPE: &str = "fixedspacing";
pub const DEFAULT_QUADRATURE_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_QUADRATURE_NUM_POINTS: usize = 5;
pub const DEFAULT_RANDOM_SEED: u64 = 0;

/// Which PDE drives the mode vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemKind {
    Burgers,
    /// Recognised in configuration; rejected when a problem is built.
    NavierStokes,
}

impl Default for SystemKind {
    fn default() -> Self {
        SystemKind::Burgers
    }
}

/// How `OutputConfig::time_step` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Additive step between output times.
    Linear,
    /// Multiplicative step (> 1) on the elapsed time.
    Logarithmic,
}

impl Default for ScheduleMode {
    fn default() -> Self {
        ScheduleMode::Linear
    }
}

/// Adaptive-step integrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Embedded Runge-Kutta pair: `rkf45` or `rkck`.
    #[serde(default = "default_solver")]
    pub solver: String,
    #[serde(default = "default_absolute_error")]
    pub absolute_error: f64,
    #[serde(default = "default_relative_error")]
    pub relative_error: f64,
    /// First trial step; the controller adapts it afterwards.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
    /// Step budget per `evolve` call (accepted + rejected).
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            solver: default_solver(),
            absolute_error: DEFAULT_LOCAL_ABSOLUTE_ERROR,
            relative_error: DEFAULT_LOCAL_RELATIVE_ERROR,
            initial_step: DEFAULT_TIME_STEP,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Output-time schedule and diagnostic switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub schedule: ScheduleMode,
    /// Step (linear) or multiplier (logarithmic).
    #[serde(default)]
    pub time_step: Option<f64>,
    /// Explicit ascending output times. Takes precedence over `time_step`.
    #[serde(default)]
    pub times: Option<Vec<f64>>,
    /// Also emit the RHS evaluated with the t-model switched on.
    #[serde(default)]
    pub t_model_rhs: bool,
    /// Log each output time at debug level.
    #[serde(default)]
    pub print_output_time: bool,
}

/// One per-mode probability density, e.g. `{"type": "1dgaussian", "parameters": [0.0, 1.0, 2]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensitySpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Vec<f64>,
}

/// Closure-estimation strategy and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClosureConfig {
    Quadrature {
        #[serde(default = "default_quadrature_type")]
        quadrature_type: String,
        #[serde(default = "default_quadrature_num_points")]
        num_points: usize,
        #[serde(default = "default_quadrature_tolerance")]
        tolerance: f64,
        /// Emit Hermite projections of rank `hermite_rank` when set.
        #[serde(default)]
        hermite_rank: Option<usize>,
    },
    MonteCarlo {
        num_runs: usize,
        #[serde(default)]
        print_run_count_increment: Option<usize>,
    },
    FiniteDifference {
        delta_x1: f64,
        delta_x2: f64,
    },
    NoClosure,
}

impl ClosureConfig {
    /// Short label used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ClosureConfig::Quadrature { .. } => "quadrature",
            ClosureConfig::MonteCarlo { .. } => "monte-carlo",
            ClosureConfig::FiniteDifference { .. } => "finite-difference",
            ClosureConfig::NoClosure => "no-closure",
        }
    }
}

/// Everything one problem run needs.
///
/// Physically meaningful values (viscosity, times, densities, perturbation
/// sizes, run counts) have no defaults and must be present. Integrator
/// tolerances, quadrature tuning and the seed fall back to documented
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub system: SystemKind,
    /// Viscosity ε in `-ε k² u_k`.
    pub viscosity: f64,
    pub start_time: f64,
    pub end_time: f64,
    /// Axis sizes `[I, J, K]`. 1-D systems use `[N, 0, 0]`.
    pub mode_shape: [usize; 3],
    /// Number of resolved modes R. `None` means every mode is resolved.
    #[serde(default)]
    pub num_resolved: Option<usize>,
    #[serde(default)]
    pub t_model: bool,
    #[serde(default)]
    pub integrator: IntegratorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Fixed initial amplitudes, zero-padded to the mode count.
    #[serde(default)]
    pub initial_conditions: Vec<f64>,
    #[serde(default)]
    pub densities: Vec<DensitySpec>,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    pub closure: ClosureConfig,
}

impl RunConfig {
    /// Minimal 1-D Burgers configuration with defaults for every optional field.
    pub fn new(
        num_modes: usize,
        viscosity: f64,
        start_time: f64,
        end_time: f64,
        closure: ClosureConfig,
    ) -> Self {
        Self {
            system: SystemKind::Burgers,
            viscosity,
            start_time,
            end_time,
            mode_shape: [num_modes, 0, 0],
            num_resolved: None,
            t_model: false,
            integrator: IntegratorConfig::default(),
            output: OutputConfig::default(),
            initial_conditions: Vec::new(),
            densities: Vec::new(),
            random_seed: DEFAULT_RANDOM_SEED,
            closure,
        }
    }

    /// Total slot count of the configured shape. Zero-sized trailing axes count as 1.
    ///
    /// Saturates on overflow; `validate` rejects such shapes.
    pub fn num_modes(&self) -> usize {
        let [i, j, k] = self.mode_shape;
        i.saturating_mul(j.max(1)).saturating_mul(k.max(1))
    }

    /// Slot count, or a config error when the product overflows.
    pub fn checked_num_modes(&self) -> OpbeResult<usize> {
        let [i, j, k] = self.mode_shape;
        i.checked_mul(j.max(1))
            .and_then(|n| n.checked_mul(k.max(1)))
            .ok_or_else(|| {
                OpbeError::Config(format!(
                    "mode_shape {:?} overflows the mode count",
                    self.mode_shape
                ))
            })
    }

    pub fn num_resolved_modes(&self) -> usize {
        self.num_resolved.unwrap_or_else(|| self.num_modes())
    }

    pub fn num_unresolved_modes(&self) -> usize {
        self.num_modes().saturating_sub(self.num_resolved_modes())
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> OpbeResult<()> {
        if !self.viscosity.is_finite() || self.viscosity < 0.0 {
            return Err(OpbeError::Config(format!(
                "viscosity must be finite and >= 0, got {}",
                self.viscosity
            )));
        }
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(OpbeError::Config(format!(
                "start_time and end_time must be finite, got {} and {}",
                self.start_time, self.end_time
            )));
        }
        if self.end_time < self.start_time {
            return Err(OpbeError::Config(format!(
                "end_time must be >= start_time, got {} < {}",
                self.end_time, self.start_time
            )));
        }
        if self.mode_shape[0] == 0 {
            return Err(OpbeError::Config(
                "mode_shape[0] must be > 0".to_string(),
            ));
        }
        let n = self.checked_num_modes()?;
        let r = self.num_resolved_modes();
        if r == 0 || r > n {
            return Err(OpbeError::Config(format!(
                "num_resolved must be in 1..={n}, got {r}"
            )));
        }
        if self.initial_conditions.len() > n {
            return Err(OpbeError::Config(format!(
                "initial_conditions has {} entries but only {n} modes exist",
                self.initial_conditions.len()
            )));
        }
        if self.initial_conditions.iter().any(|v| !v.is_finite()) {
            return Err(OpbeError::Config(
                "initial_conditions must be finite".to_string(),
            ));
        }
        self.validate_integrator()?;
        self.validate_output()?;
        self.validate_closure()
    }

    fn validate_integrator(&self) -> OpbeResult<()> {
        let ic = &self.integrator;
        if !matches!(ic.solver.to_ascii_lowercase().as_str(), "rkf45" | "rkck") {
            return Err(OpbeError::Config(format!(
                "unknown solver '{}', expected rkf45 or rkck",
                ic.solver
            )));
        }
        if !(ic.absolute_error >= 0.0) || !(ic.relative_error >= 0.0) {
            return Err(OpbeError::Config(format!(
                "local error tolerances must be >= 0, got abs={} rel={}",
                ic.absolute_error, ic.relative_error
            )));
        }
        if ic.absolute_error == 0.0 && ic.relative_error == 0.0 {
            return Err(OpbeError::Config(
                "at least one of absolute_error, relative_error must be > 0".to_string(),
            ));
        }
        if !(ic.initial_step > 0.0) || !ic.initial_step.is_finite() {
            return Err(OpbeError::Config(format!(
                "initial_step must be > 0, got {}",
                ic.initial_step
            )));
        }
        if ic.max_steps == 0 {
            return Err(OpbeError::Config("max_steps must be > 0".to_string()));
        }
        Ok(())
    }

    fn validate_output(&self) -> OpbeResult<()> {
        let out = &self.output;
        if let Some(times) = &out.times {
            if times.is_empty() {
                return Err(OpbeError::Config(
                    "output.times must not be empty".to_string(),
                ));
            }
            return Ok(());
        }
        if let Some(step) = out.time_step {
            match out.schedule {
                ScheduleMode::Linear if !(step > 0.0) => {
                    return Err(OpbeError::Config(format!(
                        "linear output time_step must be > 0, got {step}"
                    )));
                }
                ScheduleMode::Logarithmic if !(step > 1.0) => {
                    return Err(OpbeError::Config(format!(
                        "logarithmic output multiplier must be > 1, got {step}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_closure(&self) -> OpbeResult<()> {
        match &self.closure {
            ClosureConfig::Quadrature {
                num_points,
                tolerance,
                ..
            } => {
                if *num_points < 2 {
                    return Err(OpbeError::Config(format!(
                        "quadrature num_points must be >= 2, got {num_points}"
                    )));
                }
                if !(*tolerance > 0.0) {
                    return Err(OpbeError::Config(format!(
                        "quadrature tolerance must be > 0, got {tolerance}"
                    )));
                }
                if self.densities.is_empty() {
                    return Err(OpbeError::Config(
                        "quadrature closure needs a density for the unresolved mode".to_string(),
                    ));
                }
            }
            ClosureConfig::MonteCarlo { num_runs, .. } => {
                if *num_runs == 0 {
                    return Err(OpbeError::Config(
                        "monte-carlo num_runs must be > 0".to_string(),
                    ));
                }
                if self.densities.is_empty() {
                    return Err(OpbeError::Config(
                        "monte-carlo closure needs at least one density".to_string(),
                    ));
                }
            }
            ClosureConfig::FiniteDifference { delta_x1, delta_x2 } => {
                for (name, d) in [("delta_x1", delta_x1), ("delta_x2", delta_x2)] {
                    if !d.is_finite() || *d == 0.0 {
                        return Err(OpbeError::Config(format!(
                            "{name} must be finite and non-zero, got {d}"
                        )));
                    }
                }
            }
            ClosureConfig::NoClosure => {}
        }
        Ok(())
    }

    /// Load from JSON string. Each documented default that fills a
    /// missing field is logged at warn level.
    pub fn from_json(json: &str) -> OpbeResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| OpbeError::Config(format!("JSON parse error: {e}")))?;
        let config = Self::deserialize(&value)
            .map_err(|e| OpbeError::Config(format!("JSON parse error: {e}")))?;
        for (param, default) in defaulted_parameters(&value) {
            log::warn!("{param} not set, using default {default}");
        }
        Ok(config)
    }

    pub fn to_json(&self) -> OpbeResult<String> {
        serde_json::to_string(self)
            .map_err(|e| OpbeError::Config(format!("JSON encode error: {e}")))
    }
}

fn is_unset(section: Option<&serde_json::Value>, key: &str) -> bool {
    section
        .and_then(|v| v.get(key))
        .map_or(true, serde_json::Value::is_null)
}

/// `(parameter, default)` for every documented default `value` relies on.
pub fn defaulted_parameters(value: &serde_json::Value) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    let root = Some(value);
    if is_unset(root, "system") {
        out.push(("system", "burgers".to_string()));
    }
    if is_unset(root, "random_seed") {
        out.push(("random_seed", DEFAULT_RANDOM_SEED.to_string()));
    }

    let integrator = value.get("integrator");
    let integrator_defaults: [(&str, &'static str, String); 5] = [
        ("solver", "integrator.solver", DEFAULT_SOLVER.to_string()),
        ("absolute_error", "integrator.absolute_error", DEFAULT_LOCAL_ABSOLUTE_ERROR.to_string()),
        ("relative_error", "integrator.relative_error", DEFAULT_LOCAL_RELATIVE_ERROR.to_string()),
        ("initial_step", "integrator.initial_step", DEFAULT_TIME_STEP.to_string()),
        ("max_steps", "integrator.max_steps", DEFAULT_MAX_STEPS.to_string()),
    ];
    for (key, param, default) in integrator_defaults {
        if is_unset(integrator, key) {
            out.push((param, default));
        }
    }

    let closure = value.get("closure");
    let is_quadrature = closure
        .and_then(|c| c.get("kind"))
        .and_then(serde_json::Value::as_str)
        == Some("quadrature");
    if is_quadrature {
        let quadrature_defaults: [(&str, &'static str, String); 3] = [
            ("quadrature_type", "closure.quadrature_type", DEFAULT_QUADRATURE_TYPE.to_string()),
            ("num_points", "closure.num_points", DEFAULT_QUADRATURE_NUM_POINTS.to_string()),
            ("tolerance", "closure.tolerance", DEFAULT_QUADRATURE_TOLERANCE.to_string()),
        ];
        for (key, param, default) in quadrature_defaults {
            if is_unset(closure, key) {
                out.push((param, default));
            }
        }
    }
    out
}

fn default_solver() -> String {
    DEFAULT_SOLVER.to_string()
}

fn default_absolute_error() -> f64 {
    DEFAULT_LOCAL_ABSOLUTE_ERROR
}

fn default_relative_error() -> f64 {
    DEFAULT_LOCAL_RELATIVE_ERROR
}

fn default_initial_step() -> f64 {
    DEFAULT_TIME_STEP
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_quadrature_type() -> String {
    DEFAULT_QUADRATURE_TYPE.to_string()
}

fn default_quadrature_num_points() -> usize {
    DEFAULT_QUADRATURE_NUM_POINTS
}

fn default_quadrature_tolerance() -> f64 {
    DEFAULT_QUADRATURE_TOLERANCE
}

fn default_random_seed() -> u64 {
    DEFAULT_RANDOM_SEED
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfig {
        RunConfig::new(4, 0.1, 0.0, 1.0, ClosureConfig::NoClosure)
    }

    #[test]
    fn test_minimal_config_valid() {
        assert!(base().validate().is_ok());
        assert_eq!(base().num_modes(), 4);
        assert_eq!(base().num_resolved_modes(), 4);
        assert_eq!(base().num_unresolved_modes(), 0);
    }

    #[test]
    fn test_negative_viscosity_rejected() {
        let mut c = base();
        c.viscosity = -0.1;
        assert!(matches!(c.validate(), Err(OpbeError::Config(_))));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut c = base();
        c.end_time = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_zero_first_axis_rejected() {
        let mut c = base();
        c.mode_shape = [0, 2, 2];
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_resolved_split_bounds() {
        let mut c = base();
        c.num_resolved = Some(0);
        assert!(c.validate().is_err());
        c.num_resolved = Some(5);
        assert!(c.validate().is_err());
        c.num_resolved = Some(3);
        assert!(c.validate().is_ok());
        assert_eq!(c.num_unresolved_modes(), 1);
    }

    #[test]
    fn test_unknown_solver_rejected() {
        let mut c = base();
        c.integrator.solver = "rk8pd".into();
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("rk8pd"), "got: {err}");
    }

    #[test]
    fn test_logarithmic_multiplier_must_exceed_one() {
        let mut c = base();
        c.output.schedule = ScheduleMode::Logarithmic;
        c.output.time_step = Some(1.0);
        assert!(c.validate().is_err());
        c.output.time_step = Some(1.1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_finite_difference_zero_delta_rejected() {
        let mut c = base();
        c.closure = ClosureConfig::FiniteDifference {
            delta_x1: 0.0,
            delta_x2: 1e-3,
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_monte_carlo_requires_density() {
        let mut c = base();
        c.closure = ClosureConfig::MonteCarlo {
            num_runs: 10,
            print_run_count_increment: None,
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let json = r#"{
            "viscosity": 0.05,
            "start_time": 0.0,
            "end_time": 2.0,
            "mode_shape": [6, 0, 0],
            "num_resolved": 5,
            "densities": [{"type": "1dgaussian", "parameters": [0.0, 1.0, 5]}],
            "closure": {"kind": "quadrature"}
        }"#;
        let c = RunConfig::from_json(json).unwrap();
        assert_eq!(c.system, SystemKind::Burgers);
        assert_eq!(c.integrator.solver, "rkf45");
        assert!((c.integrator.absolute_error - 1e-6).abs() < 1e-18);
        assert_eq!(c.random_seed, 0);
        match &c.closure {
            ClosureConfig::Quadrature {
                quadrature_type,
                num_points,
                tolerance,
                hermite_rank,
            } => {
                assert_eq!(quadrature_type, "fixedspacing");
                assert_eq!(*num_points, 5);
                assert!((tolerance - 1e-4).abs() < 1e-18);
                assert!(hermite_rank.is_none());
            }
            other => panic!("expected quadrature, got {other:?}"),
        }
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_defaulted_parameters_listed() {
        let json = r#"{
            "viscosity": 0.05,
            "start_time": 0.0,
            "end_time": 2.0,
            "mode_shape": [6, 0, 0],
            "random_seed": 3,
            "integrator": {"solver": "rkck", "max_steps": 500},
            "closure": {"kind": "quadrature", "num_points": 9}
        }"#;
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = defaulted_parameters(&value).iter().map(|(p, _)| *p).collect();
        assert_eq!(
            names,
            vec![
                "system",
                "integrator.absolute_error",
                "integrator.relative_error",
                "integrator.initial_step",
                "closure.quadrature_type",
                "closure.tolerance",
            ]
        );
        let c = RunConfig::from_json(json).unwrap();
        assert_eq!(c.integrator.solver, "rkck");
        assert_eq!(c.integrator.max_steps, 500);
        assert_eq!(c.integrator.initial_step, DEFAULT_TIME_STEP);
        assert_eq!(c.integrator.relative_error, DEFAULT_LOCAL_RELATIVE_ERROR);
    }

    #[test]
    fn test_fully_specified_config_has_no_defaults() {
        let json = r#"{
            "system": "burgers",
            "viscosity": 0.05,
            "start_time": 0.0,
            "end_time": 2.0,
            "mode_shape": [6, 0, 0],
            "random_seed": 0,
            "integrator": {"solver": "rkf45", "absolute_error": 1e-8, "relative_error": 0.0,
                           "initial_step": 0.01, "max_steps": 1000},
            "closure": {"kind": "no-closure"}
        }"#;
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(defaulted_parameters(&value).is_empty());
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let mut c = base();
        c.mode_shape = [usize::MAX, 2, 0];
        assert!(matches!(c.checked_num_modes(), Err(OpbeError::Config(_))));
        assert_eq!(c.num_modes(), usize::MAX);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"), "got: {err}");
        c.mode_shape = [4, 3, 2];
        assert_eq!(c.checked_num_modes().unwrap(), 24);
    }

    #[test]
    fn test_missing_viscosity_is_parse_error() {
        let json = r#"{"start_time": 0.0, "end_time": 1.0, "mode_shape": [4,0,0],
                       "closure": {"kind": "no-closure"}}"#;
        let err = RunConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("viscosity"), "got: {err}");
    }

    #[test]
    fn test_json_round_trip_keeps_closure() {
        let mut c = base();
        c.closure = ClosureConfig::FiniteDifference {
            delta_x1: 1e-3,
            delta_x2: 2e-3,
        };
        let back = RunConfig::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(back.closure, c.closure);
    }
}
