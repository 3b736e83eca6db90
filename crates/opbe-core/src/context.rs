// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Run Context
// ─────────────────────────────────────────────────────────────────────
//! Everything a run shares read-only: the validated configuration, the
//! mode index with its resolved split, the viscosity, integrator
//! settings, the output schedule, parsed densities and the zero-padded
//! initial condition. States borrow it for the whole run.

use opbe_physics::{Density, ModeIndex, PhysicalParams, RunSettings, SpectralState};
use opbe_types::{OpbeError, OpbeResult, RunConfig, SystemKind};

use crate::schedule::OutputSchedule;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: RunConfig,
    pub index: ModeIndex,
    pub params: PhysicalParams,
    pub settings: RunSettings,
    pub schedule: OutputSchedule,
    pub densities: Vec<Density>,
    pub initial_conditions: Vec<f64>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> OpbeResult<Self> {
        config.validate()?;
        if config.system == SystemKind::NavierStokes {
            return Err(OpbeError::Config(
                "navier-stokes problems are not implemented".to_string(),
            ));
        }

        let mut index = ModeIndex::new(config.mode_shape)?;
        index.set_resolved_split(config.num_resolved_modes(), config.num_unresolved_modes())?;

        let params = PhysicalParams::new(config.viscosity)?;
        let settings = RunSettings::from_config(&config)?;
        let schedule = OutputSchedule::from_config(&config.output, config.start_time, config.end_time)?;
        let densities = config
            .densities
            .iter()
            .map(Density::from_spec)
            .collect::<OpbeResult<Vec<_>>>()?;

        let mut initial_conditions = config.initial_conditions.clone();
        initial_conditions.resize(index.num_modes(), 0.0);

        Ok(Self {
            config,
            index,
            params,
            settings,
            schedule,
            densities,
            initial_conditions,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.index.num_modes()
    }

    pub fn num_resolved(&self) -> usize {
        self.index.num_resolved()
    }

    /// Fresh state seeded with the configured initial condition.
    pub fn new_state(&self) -> OpbeResult<SpectralState<'_>> {
        let mut state = SpectralState::new(&self.index, &self.params, &self.settings);
        state.set_initial_conditions(&self.initial_conditions)?;
        state.reset_to_initial_condition();
        Ok(state)
    }
}
