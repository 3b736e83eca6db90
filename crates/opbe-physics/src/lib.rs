// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Spectral Physics Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Spectral physics: mode indexing, seeding densities, Hermite basis,
//! embedded Runge-Kutta integration, and the truncated Burgers state
//! with its t-model correction and resolved-feedback term.

pub mod density;
pub mod grid;
pub mod hermite;
pub mod integrator;
pub mod mode_index;
pub mod params;
pub mod random;
pub mod system;

pub use density::{expand_to_modes, Density};
pub use grid::{trapezoid, UniformGrid};
pub use hermite::HermiteBasis;
pub use integrator::{IntegrationStats, IntegratorSettings, OdeIntegrator, SolverPhase, StepperKind};
pub use mode_index::ModeIndex;
pub use params::{PhysicalParams, RunSettings};
pub use random::RandomSource;
pub use system::{burgers_rhs, evaluate_rhs, resolved_feedback, SpectralState};
