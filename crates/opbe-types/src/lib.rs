// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, run configuration, and error hierarchy for the
//! OPBE closure kernel: truncated spectral Burgers dynamics with
//! statistical estimates of the unresolved-mode memory kernel.

pub mod config;
pub mod error;
pub mod record;

pub use config::{
    ClosureConfig, DensitySpec, IntegratorConfig, OutputConfig, RunConfig, ScheduleMode,
    SystemKind,
};
pub use error::{OpbeError, OpbeResult};
pub use record::{OutputRecord, RunSummary};
