// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Evolution orchestrator and closure-estimation strategies.
//!
//! A `Problem` owns an ensemble of `SpectralState`s that borrow one
//! shared `RunContext`. Every scheduled output time it advances all of
//! them to the same target, asks the active `ClosureStrategy` for its
//! memory-kernel estimate, and hands an `OutputRecord` to the sink.
//!
//! # Invariants
//!
//! 1. **Lock-step ensemble**: no state lags; after each step every member
//!    sits at exactly the scheduled time.
//! 2. **Fatal errors**: configuration, sequence, numerical and index
//!    errors abort the run. Nothing is retried and no physically
//!    meaningful value is defaulted.
//! 3. **Shared read-only context**: the mode index, viscosity and run
//!    settings are fixed before the first state is built.

pub mod closure;
pub mod context;
pub mod output;
pub mod problem;
pub mod schedule;

pub use closure::{ClosureStrategy, Estimate};
pub use context::RunContext;
pub use output::{JsonLinesSink, MemorySink, OutputSink};
pub use problem::{run_problem, Problem, ProblemState};
pub use schedule::OutputSchedule;
