// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Physical Parameters and Run Settings
// ─────────────────────────────────────────────────────────────────────
//! Read-only values shared by every state in an ensemble.

use serde::{Deserialize, Serialize};

use opbe_types::config::RunConfig;
use opbe_types::{OpbeError, OpbeResult, SystemKind};

use crate::integrator::IntegratorSettings;

pub const ONE_OVER_PI: f64 = std::f64::consts::FRAC_1_PI;
pub const ONE_OVER_2PI: f64 = 0.5 * std::f64::consts::FRAC_1_PI;
/// 1/√(2π), Gaussian normalisation.
pub const ONE_OVER_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Highest moment order reported per output record.
pub const DEFAULT_NUM_MOMENTS: usize = 10;

/// Orthogonality tolerance for Hermite grid construction.
pub const DEFAULT_HERMITE_TOLERANCE: f64 = 1e-3;

/// Viscosity shared by all states of a run. Set once before evolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalParams {
    pub viscosity: f64,
}

impl PhysicalParams {
    pub fn new(viscosity: f64) -> OpbeResult<Self> {
        if !viscosity.is_finite() || viscosity < 0.0 {
            return Err(OpbeError::Config(format!(
                "viscosity must be finite and >= 0, got {viscosity}"
            )));
        }
        Ok(Self { viscosity })
    }

    /// Re = 1/ε. Infinite for the inviscid system.
    pub fn reynolds_number(&self) -> f64 {
        if self.viscosity == 0.0 {
            f64::INFINITY
        } else {
            1.0 / self.viscosity
        }
    }
}

/// Run-wide settings every `SpectralState` reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub system: SystemKind,
    pub start_time: f64,
    pub end_time: f64,
    pub t_model: bool,
    pub num_moments: usize,
    pub integrator: IntegratorSettings,
}

impl RunSettings {
    pub fn from_config(config: &RunConfig) -> OpbeResult<Self> {
        Ok(Self {
            system: config.system,
            start_time: config.start_time,
            end_time: config.end_time,
            t_model: config.t_model,
            num_moments: DEFAULT_NUM_MOMENTS,
            integrator: IntegratorSettings::from_config(&config.integrator)?,
        })
    }
}
