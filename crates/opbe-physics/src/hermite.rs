// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Hermite Basis
// ─────────────────────────────────────────────────────────────────────
//! Hermite polynomials orthonormal with respect to a 1-D Gaussian
//! density N(μ, σ²):
//!
//!   y      = (x - μ) / (√2 σ)
//!   H_0    = 1,  H_1 = 2y,  H_{n+1} = 2y H_n - 2n H_{n-1}
//!   ĥ_n(x) = H_n(y) / ∏_{m=1}^{n} √(2m)
//!
//! Normalisation factors live on the instance, one basis per density.

use opbe_types::{OpbeError, OpbeResult};

use crate::density::Density;
use crate::grid::{trapezoid, UniformGrid};
use crate::params::DEFAULT_HERMITE_TOLERANCE;

const INITIAL_GRID_POINTS: usize = 5;
const GRID_GROWTH: f64 = 1.1;
const MAX_WIDENINGS: usize = 200;
const MAX_GRID_POINTS: usize = 200_000;

#[derive(Debug, Clone)]
pub struct HermiteBasis {
    density: Density,
    norms: Vec<f64>,
}

impl HermiteBasis {
    /// Basis of `rank` polynomials (degrees `0..rank`).
    pub fn new(density: Density, rank: usize) -> OpbeResult<Self> {
        if rank == 0 {
            return Err(OpbeError::Config(
                "hermite basis rank must be > 0".to_string(),
            ));
        }
        let mut norms = Vec::with_capacity(rank);
        let mut product = 1.0;
        norms.push(1.0);
        for n in 1..rank {
            product *= (2.0 * n as f64).sqrt();
            norms.push(1.0 / product);
        }
        Ok(Self { density, norms })
    }

    pub fn rank(&self) -> usize {
        self.norms.len()
    }

    pub fn density(&self) -> &Density {
        &self.density
    }

    pub fn normalization(&self, n: usize) -> OpbeResult<f64> {
        self.norms.get(n).copied().ok_or_else(|| {
            OpbeError::Index(format!(
                "hermite degree {n} outside basis rank {}",
                self.rank()
            ))
        })
    }

    /// Normalised polynomial of degree `n` at `x`.
    pub fn evaluate(&self, x: f64, n: usize) -> OpbeResult<f64> {
        let norm = self.normalization(n)?;
        let y = (x - self.density.mean()) / (std::f64::consts::SQRT_2 * self.density.std_dev());
        Ok(norm * physicists_hermite(y, n))
    }

    /// `∫ f(x) ĥ_n(x) ρ(x) dx` by the trapezoidal rule over `grid`.
    pub fn inner_product(&self, f: &[f64], grid: &UniformGrid, n: usize) -> OpbeResult<f64> {
        if f.len() != grid.len {
            return Err(OpbeError::Config(format!(
                "inner product: {} samples for a {}-point grid",
                f.len(),
                grid.len
            )));
        }
        let mut integrand = Vec::with_capacity(grid.len);
        for (j, x) in grid.points().enumerate() {
            integrand.push(f[j] * self.evaluate(x, n)? * self.density.value(x));
        }
        trapezoid(grid.spacing, &integrand)
    }

    /// Coefficients `⟨f, ĥ_n⟩` for every degree in the basis.
    pub fn project(&self, f: &[f64], grid: &UniformGrid) -> OpbeResult<Vec<f64>> {
        (0..self.rank())
            .map(|n| self.inner_product(f, grid, n))
            .collect()
    }

    /// Largest `|⟨ĥ_i, ĥ_j⟩ - δ_ij|` over the basis on `grid`.
    pub fn orthogonality_error(&self, grid: &UniformGrid) -> OpbeResult<f64> {
        let mut table = Vec::with_capacity(self.rank());
        for n in 0..self.rank() {
            let column = grid
                .points()
                .map(|x| self.evaluate(x, n))
                .collect::<OpbeResult<Vec<f64>>>()?;
            table.push(column);
        }
        let mut worst: f64 = 0.0;
        for i in 0..self.rank() {
            for j in i..self.rank() {
                let product: Vec<f64> = table[i].iter().zip(&table[j]).map(|(a, b)| a * b).collect();
                let ip = self.inner_product(&product, grid, 0)?;
                let target = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((ip - target).abs());
            }
        }
        Ok(worst)
    }

    /// Uniform grid on which the basis is orthonormal to within `tolerance`.
    ///
    /// Starts from `[μ-σ, μ+σ]` with 5 points. Each round refines the
    /// point count by ×1.1 until the orthogonality error stops changing,
    /// then widens the range by ×1.1 until the error is below tolerance.
    /// A non-positive tolerance selects the default.
    pub fn make_grid(&self, tolerance: f64) -> OpbeResult<UniformGrid> {
        let tol = if tolerance > 0.0 {
            tolerance
        } else {
            DEFAULT_HERMITE_TOLERANCE
        };
        let mu = self.density.mean();
        let mut half = self.density.std_dev();
        let mut points = INITIAL_GRID_POINTS;

        for _ in 0..MAX_WIDENINGS {
            let mut grid = UniformGrid::new(mu - half, mu + half, points)?;
            let mut error = self.orthogonality_error(&grid)?;
            loop {
                let refined = grown(points);
                if refined > MAX_GRID_POINTS {
                    return Err(OpbeError::Numerical(format!(
                        "hermite grid: refinement exceeded {MAX_GRID_POINTS} points"
                    )));
                }
                let candidate = UniformGrid::new(mu - half, mu + half, refined)?;
                let refined_error = self.orthogonality_error(&candidate)?;
                let settled = (refined_error - error).abs() < tol;
                points = refined;
                grid = candidate;
                error = refined_error;
                if settled {
                    break;
                }
            }
            if error < tol {
                log::debug!(
                    "hermite grid: rank {} on [{:.4}, {:.4}] with {} points, error {:.3e}",
                    self.rank(),
                    grid.start,
                    grid.end(),
                    grid.len,
                    error
                );
                return Ok(grid);
            }
            half *= GRID_GROWTH;
        }
        Err(OpbeError::Numerical(format!(
            "hermite grid: orthogonality error did not fall below {tol} after {MAX_WIDENINGS} widenings"
        )))
    }
}

fn grown(points: usize) -> usize {
    ((points as f64 * GRID_GROWTH).ceil() as usize).max(points + 1)
}

/// Physicists' Hermite polynomial H_n(y) by the three-term recurrence.
fn physicists_hermite(y: f64, n: usize) -> f64 {
    let mut prev = 1.0;
    if n == 0 {
        return prev;
    }
    let mut curr = 2.0 * y;
    for k in 1..n {
        let next = 2.0 * y * curr - 2.0 * k as f64 * prev;
        prev = curr;
        curr = next;
    }
    curr
}
