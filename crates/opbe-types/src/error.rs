// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all kernel failures.
///
/// Every variant is fatal for the run that raised it: nothing inside the
/// kernel retries or substitutes a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpbeError {
    /// Malformed or missing run parameters, unsupported combinations.
    #[error("config error: {0}")]
    Config(String),

    /// Solver lifecycle call made in the wrong phase
    /// (e.g. `evolve` outside RUN, cleanup outside STOP).
    #[error("sequence error: {0}")]
    Sequence(String),

    /// Integrator could not meet its tolerances, a domain bound could
    /// not be found, or a NaN/Inf appeared in the state.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Mode or feedback query outside the valid range.
    #[error("index error: {0}")]
    Index(String),

    /// Output sink rejected a record.
    #[error("output error: {0}")]
    Output(String),
}

pub type OpbeResult<T> = Result<T, OpbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_label() {
        let e = OpbeError::Index("slot 7 out of range".into());
        assert_eq!(e.to_string(), "index error: slot 7 out of range");
        let e = OpbeError::Sequence("evolve outside RUN".into());
        assert!(e.to_string().starts_with("sequence error"));
    }
}
