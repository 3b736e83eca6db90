// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Seeding Densities
// ─────────────────────────────────────────────────────────────────────
//! Parametrised 1-D densities used to sample Monte-Carlo initial
//! conditions, weight quadrature nodes and bound integration domains.
//!
//! Each density is tagged with the 0-based mode slot it describes.

use serde::{Deserialize, Serialize};

use opbe_types::{DensitySpec, OpbeError, OpbeResult};

use crate::params::ONE_OVER_SQRT_2PI;
use crate::random::RandomSource;

const GAUSSIAN_1D_NAME: &str = "1dgaussian";
const GAUSSIAN_1D_NUM_PARAMETERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Density {
    /// Parameters: mean, standard deviation (> 0), mode slot.
    Gaussian1d { mean: f64, std_dev: f64, mode: usize },
}

impl Density {
    pub fn gaussian(mean: f64, std_dev: f64, mode: usize) -> OpbeResult<Self> {
        if !mean.is_finite() {
            return Err(OpbeError::Config(format!(
                "gaussian density: mean must be finite, got {mean}"
            )));
        }
        if !(std_dev > 0.0) || !std_dev.is_finite() {
            return Err(OpbeError::Config(format!(
                "gaussian density: standard deviation must be > 0, got {std_dev}"
            )));
        }
        Ok(Density::Gaussian1d {
            mean,
            std_dev,
            mode,
        })
    }

    /// Number of parameters the named density type takes.
    pub fn num_parameters(kind: &str) -> OpbeResult<usize> {
        match kind.to_ascii_lowercase().as_str() {
            GAUSSIAN_1D_NAME => Ok(GAUSSIAN_1D_NUM_PARAMETERS),
            other => Err(OpbeError::Config(format!("unknown density type '{other}'"))),
        }
    }

    pub fn parse(kind: &str, parameters: &[f64]) -> OpbeResult<Self> {
        let expected = Self::num_parameters(kind)?;
        if parameters.len() != expected {
            return Err(OpbeError::Config(format!(
                "density '{kind}' takes {expected} parameters, got {}",
                parameters.len()
            )));
        }
        let mode = mode_from_parameter(parameters[2])?;
        Self::gaussian(parameters[0], parameters[1], mode)
    }

    pub fn from_spec(spec: &DensitySpec) -> OpbeResult<Self> {
        Self::parse(&spec.kind, &spec.parameters)
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Density::Gaussian1d { mean, .. } => mean,
        }
    }

    pub fn std_dev(&self) -> f64 {
        match *self {
            Density::Gaussian1d { std_dev, .. } => std_dev,
        }
    }

    pub fn variance(&self) -> f64 {
        self.std_dev() * self.std_dev()
    }

    pub fn mode(&self) -> usize {
        match *self {
            Density::Gaussian1d { mode, .. } => mode,
        }
    }

    pub fn with_mode(&self, mode: usize) -> Self {
        match *self {
            Density::Gaussian1d { mean, std_dev, .. } => Density::Gaussian1d {
                mean,
                std_dev,
                mode,
            },
        }
    }

    /// Pointwise density value.
    pub fn value(&self, x: f64) -> f64 {
        match *self {
            Density::Gaussian1d { mean, std_dev, .. } => {
                let z = (x - mean) / std_dev;
                ONE_OVER_SQRT_2PI / std_dev * (-0.5 * z * z).exp()
            }
        }
    }

    /// Symmetric interval outside which the density is below `tolerance`.
    ///
    /// Fails when the tolerance is at or above the peak value, since no
    /// decaying bound exists then.
    pub fn domain_bounds(&self, tolerance: f64) -> OpbeResult<(f64, f64)> {
        if !(tolerance > 0.0) {
            return Err(OpbeError::Numerical(format!(
                "domain bounds: tolerance must be > 0, got {tolerance}"
            )));
        }
        match *self {
            Density::Gaussian1d { mean, std_dev, .. } => {
                let term = (tolerance * std_dev / ONE_OVER_SQRT_2PI).ln();
                if term >= 0.0 {
                    return Err(OpbeError::Numerical(format!(
                        "domain bounds: tolerance {tolerance} is not below the peak density {}",
                        self.value(mean)
                    )));
                }
                let half = std_dev * (-2.0 * term).sqrt();
                Ok((mean - half, mean + half))
            }
        }
    }

    pub fn sample(&self, rng: &RandomSource) -> OpbeResult<f64> {
        match *self {
            Density::Gaussian1d { mean, std_dev, .. } => rng.gaussian(mean, std_dev),
        }
    }
}

fn mode_from_parameter(raw: f64) -> OpbeResult<usize> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 {
        return Err(OpbeError::Config(format!(
            "density mode index must be a non-negative integer, got {raw}"
        )));
    }
    Ok(raw as usize)
}

/// One density per mode slot `0..num_modes`.
///
/// A slot with no explicit density inherits the nearest lower slot's
/// density, re-tagged with its own index. Slot 0 must be given.
pub fn expand_to_modes(densities: &[Density], num_modes: usize) -> OpbeResult<Vec<Density>> {
    let mut explicit: Vec<Option<Density>> = vec![None; num_modes];
    for d in densities {
        let m = d.mode();
        if m >= num_modes {
            return Err(OpbeError::Config(format!(
                "density for mode {m} but only {num_modes} modes exist"
            )));
        }
        if explicit[m].is_some() {
            return Err(OpbeError::Config(format!(
                "more than one density given for mode {m}"
            )));
        }
        explicit[m] = Some(*d);
    }
    let mut expanded = Vec::with_capacity(num_modes);
    let mut last: Option<Density> = None;
    for (m, slot) in explicit.into_iter().enumerate() {
        let d = match (slot, last) {
            (Some(d), _) => d,
            (None, Some(prev)) => prev.with_mode(m),
            (None, None) => {
                return Err(OpbeError::Config(
                    "no density given for mode 0".to_string(),
                ))
            }
        };
        expanded.push(d);
        last = Some(d);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gaussian() {
        let d = Density::parse("1DGaussian", &[0.5, 2.0, 3.0]).unwrap();
        assert_eq!(d.mean(), 0.5);
        assert_eq!(d.std_dev(), 2.0);
        assert_eq!(d.mode(), 3);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Density::parse("lognormal", &[0.0, 1.0, 0.0]).is_err());
        assert!(Density::parse("1dgaussian", &[0.0, 1.0]).is_err());
        assert!(Density::parse("1dgaussian", &[0.0, 0.0, 0.0]).is_err());
        assert!(Density::parse("1dgaussian", &[0.0, 1.0, -1.0]).is_err());
        assert!(Density::parse("1dgaussian", &[0.0, 1.0, 1.5]).is_err());
    }

    #[test]
    fn test_value_peak() {
        let d = Density::gaussian(1.0, 0.5, 0).unwrap();
        let peak = ONE_OVER_SQRT_2PI / 0.5;
        assert!((d.value(1.0) - peak).abs() < 1e-14);
        assert!((d.value(0.5) - d.value(1.5)).abs() < 1e-14);
    }

    #[test]
    fn test_domain_bounds_hit_tolerance() {
        let d = Density::gaussian(0.0, 1.0, 0).unwrap();
        let tol = 1e-4;
        let (lo, hi) = d.domain_bounds(tol).unwrap();
        assert!((lo + hi).abs() < 1e-12, "bounds not symmetric: {lo}, {hi}");
        assert!((d.value(hi) - tol).abs() < 1e-12, "value at bound {}", d.value(hi));
    }

    #[test]
    fn test_domain_bounds_fail_above_peak() {
        let d = Density::gaussian(0.0, 1.0, 0).unwrap();
        assert!(matches!(d.domain_bounds(0.5), Err(OpbeError::Numerical(_))));
        assert!(d.domain_bounds(0.0).is_err());
    }

    #[test]
    fn test_expand_inherits_lower_mode() {
        let d0 = Density::gaussian(0.0, 1.0, 0).unwrap();
        let d2 = Density::gaussian(5.0, 0.1, 2).unwrap();
        let all = expand_to_modes(&[d2, d0], 5).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[1], d0.with_mode(1));
        assert_eq!(all[2], d2);
        assert_eq!(all[4].mean(), 5.0);
        for (m, d) in all.iter().enumerate() {
            assert_eq!(d.mode(), m);
        }
    }

    #[test]
    fn test_expand_requires_mode_zero() {
        let d1 = Density::gaussian(0.0, 1.0, 1).unwrap();
        assert!(expand_to_modes(&[d1], 3).is_err());
    }

    #[test]
    fn test_expand_rejects_duplicates_and_overflow() {
        let d0 = Density::gaussian(0.0, 1.0, 0).unwrap();
        assert!(expand_to_modes(&[d0, d0], 3).is_err());
        let d9 = Density::gaussian(0.0, 1.0, 9).unwrap();
        assert!(expand_to_modes(&[d0, d9], 3).is_err());
    }
}
