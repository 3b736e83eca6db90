// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Seeded Random Source
// ─────────────────────────────────────────────────────────────────────
//! One seeded generator per run, owned by the caller and passed by
//! reference. Draws are serialised through a mutex so a shared `&self`
//! is enough to sample.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use opbe_types::{OpbeError, OpbeResult};

pub struct RandomSource {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Gaussian variate with the given mean and standard deviation.
    pub fn gaussian(&self, mean: f64, std_dev: f64) -> OpbeResult<f64> {
        let normal = Normal::new(mean, std_dev).map_err(|e| {
            OpbeError::Config(format!(
                "gaussian draw with mean={mean} sd={std_dev}: {e}"
            ))
        })?;
        let mut rng = self.rng.lock();
        Ok(normal.sample(&mut *rng))
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource").field("seed", &self.seed).finish()
    }
}
