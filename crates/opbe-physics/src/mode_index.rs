// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Mode Index
// ─────────────────────────────────────────────────────────────────────
//! Wavenumber ↔ storage-slot mapping and the resolved/unresolved split.
//!
//! Wavenumbers are 1-based, slots 0-based:
//!
//!   slot(k)       = k - 1
//!   slot(i, j, k) = i - 1 + I·((j - 1) + (k - 1)·J)
//!
//! Modes 1..=R are resolved, R+1..=R+U are unresolved.

use serde::{Deserialize, Serialize};

use opbe_types::{OpbeError, OpbeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeIndex {
    sizes: [usize; 3],
    split: Option<(usize, usize)>,
}

impl ModeIndex {
    /// Index over `shape = [I, J, K]`. `I` must be positive.
    pub fn new(shape: [usize; 3]) -> OpbeResult<Self> {
        let mut index = Self {
            sizes: [0; 3],
            split: None,
        };
        index.set(shape)?;
        Ok(index)
    }

    /// 1-D index with `num_resolved` resolved modes out of `num_modes`.
    pub fn one_dimensional(num_modes: usize, num_resolved: usize) -> OpbeResult<Self> {
        let mut index = Self::new([num_modes, 0, 0])?;
        index.set_resolved_split(num_resolved, num_modes.saturating_sub(num_resolved))?;
        Ok(index)
    }

    pub fn set(&mut self, shape: [usize; 3]) -> OpbeResult<()> {
        if shape[0] == 0 {
            return Err(OpbeError::Config(
                "mode index: first axis size must be > 0".to_string(),
            ));
        }
        if self.split.is_some() && shape != self.sizes {
            return Err(OpbeError::Config(
                "mode index: shape cannot change once the resolved split is fixed".to_string(),
            ));
        }
        shape[0]
            .checked_mul(shape[1].max(1))
            .and_then(|n| n.checked_mul(shape[2].max(1)))
            .ok_or_else(|| {
                OpbeError::Config(format!("mode index: shape {shape:?} overflows the slot count"))
            })?;
        self.sizes = shape;
        Ok(())
    }

    /// Fix the partition. Calling again with different values fails.
    pub fn set_resolved_split(&mut self, num_resolved: usize, num_unresolved: usize) -> OpbeResult<()> {
        if num_resolved == 0 {
            return Err(OpbeError::Config(
                "mode index: number of resolved modes must be > 0".to_string(),
            ));
        }
        if num_resolved.checked_add(num_unresolved) != Some(self.max()) {
            return Err(OpbeError::Config(format!(
                "mode index: {num_resolved} resolved + {num_unresolved} unresolved != {} modes",
                self.max()
            )));
        }
        match self.split {
            Some(current) if current != (num_resolved, num_unresolved) => {
                Err(OpbeError::Config(format!(
                    "mode index: split already fixed at {current:?}"
                )))
            }
            _ => {
                self.split = Some((num_resolved, num_unresolved));
                Ok(())
            }
        }
    }

    pub fn sizes(&self) -> [usize; 3] {
        self.sizes
    }

    pub fn is_three_dimensional(&self) -> bool {
        self.sizes[1] > 0 || self.sizes[2] > 0
    }

    /// Total addressable slots. Zero-sized axes count as 1.
    pub fn max(&self) -> usize {
        self.sizes[0] * self.sizes[1].max(1) * self.sizes[2].max(1)
    }

    pub fn num_modes(&self) -> usize {
        self.max()
    }

    /// Resolved count; every mode until a split is fixed.
    pub fn num_resolved(&self) -> usize {
        self.split.map_or(self.max(), |(r, _)| r)
    }

    pub fn num_unresolved(&self) -> usize {
        self.split.map_or(0, |(_, u)| u)
    }

    #[inline]
    pub fn slot(&self, k: usize) -> usize {
        k - 1
    }

    pub fn checked_slot(&self, k: usize) -> OpbeResult<usize> {
        if k == 0 || k > self.max() {
            return Err(OpbeError::Index(format!(
                "wavenumber {k} outside 1..={}",
                self.max()
            )));
        }
        Ok(self.slot(k))
    }

    #[inline]
    pub fn slot3(&self, i: usize, j: usize, k: usize) -> usize {
        let ni = self.sizes[0];
        let nj = self.sizes[1].max(1);
        i - 1 + ni * ((j - 1) + (k - 1) * nj)
    }

    pub fn checked_slot3(&self, i: usize, j: usize, k: usize) -> OpbeResult<usize> {
        let [ni, nj, nk] = self.sizes;
        let in_axis = |v: usize, n: usize| v >= 1 && v <= n.max(1);
        if !(in_axis(i, ni) && in_axis(j, nj) && in_axis(k, nk)) {
            return Err(OpbeError::Index(format!(
                "wavenumber ({i}, {j}, {k}) outside shape {:?}",
                self.sizes
            )));
        }
        Ok(self.slot3(i, j, k))
    }

    pub fn in_resolved_range(&self, k: usize) -> bool {
        k >= 1 && k <= self.num_resolved()
    }
}
