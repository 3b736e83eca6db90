// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied: PyO3 proc macros generate
// unsafe blocks internally. All hand-written code in this crate is safe.
//! Python-callable wrappers around the OPBE closure kernel.
//!
//! Exposes `RunConfig`, `run_problem`, and the raw `burgers_rhs` /
//! `resolved_feedback` evaluators.
//!
//! # FFI Safety
//!
//! - Every kernel error becomes a Python `ValueError`; nothing panics
//!   across the boundary.
//! - Configs are validated before they are stored.
//!
//! Usage from Python:
//! ```python
//! from opbe_kernel import RunConfig, run_problem
//!
//! cfg = RunConfig('{"viscosity": 0.1, "start_time": 0, "end_time": 1,'
//!                 ' "mode_shape": [8, 0, 0], "closure": {"kind": "no-closure"}}')
//! records = run_problem(cfg)
//! ```

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use opbe_core::MemorySink;
use opbe_physics::system::{evaluate_rhs, resolved_feedback as feedback_of};
use opbe_types::{OpbeError, OutputRecord, RunConfig, SystemKind};

fn to_py_err(e: OpbeError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

// ─── PyRunConfig ────────────────────────────────────────────────────

/// Python-visible run configuration, built from a JSON document.
#[pyclass(name = "RunConfig")]
#[derive(Clone)]
struct PyRunConfig {
    inner: RunConfig,
}

#[pymethods]
impl PyRunConfig {
    #[new]
    fn new(json: &str) -> PyResult<Self> {
        let config = RunConfig::from_json(json).map_err(to_py_err)?;
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    #[getter]
    fn num_modes(&self) -> usize {
        self.inner.num_modes()
    }

    #[getter]
    fn num_resolved(&self) -> usize {
        self.inner.num_resolved_modes()
    }

    #[getter]
    fn closure(&self) -> &'static str {
        self.inner.closure.name()
    }

    fn __repr__(&self) -> String {
        format!(
            "RunConfig(closure={}, modes={}, resolved={}, viscosity={}, t=[{}, {}])",
            self.inner.closure.name(),
            self.inner.num_modes(),
            self.inner.num_resolved_modes(),
            self.inner.viscosity,
            self.inner.start_time,
            self.inner.end_time
        )
    }
}

// ─── Functions ──────────────────────────────────────────────────────

fn record_to_dict<'py>(py: Python<'py>, r: &OutputRecord) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("time", r.time)?;
    dict.set_item("modes", r.modes.clone())?;
    dict.set_item("energy_total", r.energy_total)?;
    dict.set_item("energy_resolved", r.energy_resolved)?;
    dict.set_item("moments", r.moments.clone())?;
    dict.set_item("feedback", r.feedback.clone())?;
    dict.set_item("projections", r.projections.clone())?;
    dict.set_item("t_model_rhs", r.t_model_rhs.clone())?;
    Ok(dict)
}

/// Run a configured problem. Returns one dict per output time.
#[pyfunction]
#[pyo3(name = "run_problem")]
fn py_run_problem(py: Python<'_>, config: &PyRunConfig) -> PyResult<PyObject> {
    let mut sink = MemorySink::new();
    opbe_core::run_problem(config.inner.clone(), &mut sink).map_err(to_py_err)?;
    let list = PyList::empty(py);
    for r in sink.records() {
        list.append(record_to_dict(py, r)?)?;
    }
    Ok(list.into_any().unbind())
}

/// Burgers right-hand side of a raw mode vector.
#[pyfunction]
#[pyo3(signature = (modes, viscosity, time = 0.0, t_model = false, num_resolved = None))]
fn burgers_rhs(
    modes: Vec<f64>,
    viscosity: f64,
    time: f64,
    t_model: bool,
    num_resolved: Option<usize>,
) -> PyResult<Vec<f64>> {
    let n = modes.len();
    let mut out = vec![0.0; n];
    let mut work = vec![0.0; n];
    evaluate_rhs(
        SystemKind::Burgers,
        &modes,
        viscosity,
        time,
        t_model,
        num_resolved.unwrap_or(n),
        &mut work,
        &mut out,
    )
    .map_err(to_py_err)?;
    Ok(out)
}

/// Resolved feedback into 0-based `slot` of a raw mode vector.
#[pyfunction]
fn resolved_feedback(modes: Vec<f64>, num_resolved: usize, slot: usize) -> PyResult<f64> {
    feedback_of(&modes, num_resolved, slot).map_err(to_py_err)
}

// ─── Module Registration ────────────────────────────────────────────

/// OPBE kernel: truncated spectral Burgers dynamics with closure estimation.
///
/// - `RunConfig`: JSON-backed, validated configuration
/// - `run_problem`: full run, returns the output records
/// - `burgers_rhs`, `resolved_feedback`: raw evaluators
#[pymodule]
fn opbe_kernel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRunConfig>()?;
    m.add_function(wrap_pyfunction!(py_run_problem, m)?)?;
    m.add_function(wrap_pyfunction!(burgers_rhs, m)?)?;
    m.add_function(wrap_pyfunction!(resolved_feedback, m)?)?;
    Ok(())
}
