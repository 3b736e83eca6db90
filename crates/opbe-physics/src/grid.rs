// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Uniform Grids and Trapezoidal Rule
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use opbe_types::{OpbeError, OpbeResult};

/// `len` equally spaced points from `start` to `start + (len-1)·spacing`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformGrid {
    pub start: f64,
    pub spacing: f64,
    pub len: usize,
}

impl UniformGrid {
    /// Grid over `[lo, hi]` with `num_points` points, both ends included.
    pub fn new(lo: f64, hi: f64, num_points: usize) -> OpbeResult<Self> {
        if num_points < 2 {
            return Err(OpbeError::Config(format!(
                "uniform grid needs at least 2 points, got {num_points}"
            )));
        }
        if !(hi > lo) || !lo.is_finite() || !hi.is_finite() {
            return Err(OpbeError::Config(format!(
                "uniform grid needs finite lo < hi, got [{lo}, {hi}]"
            )));
        }
        Ok(Self {
            start: lo,
            spacing: (hi - lo) / (num_points - 1) as f64,
            len: num_points,
        })
    }

    pub fn end(&self) -> f64 {
        self.point(self.len - 1)
    }

    #[inline]
    pub fn point(&self, j: usize) -> f64 {
        self.start + j as f64 * self.spacing
    }

    pub fn points(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |j| self.point(j))
    }
}

/// Composite trapezoidal rule: weight ½ at both ends, 1 inside, times spacing.
pub fn trapezoid(spacing: f64, samples: &[f64]) -> OpbeResult<f64> {
    let n = samples.len();
    if n < 2 {
        return Err(OpbeError::Config(format!(
            "trapezoidal rule needs at least 2 samples, got {n}"
        )));
    }
    let interior: f64 = samples[1..n - 1].iter().sum();
    Ok(spacing * (0.5 * (samples[0] + samples[n - 1]) + interior))
}
