//! Random source used for vitals sampling and inclination decisions

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform randomness consumed by the simulator
///
/// Each simulated bed owns its own source; nothing here is shared between beds.
pub trait RandomSource: Send {
    /// Uniform real in `[0, 1)`
    fn next_unit(&mut self) -> f64;

    /// Uniform integer in `[0, bound)`; `bound` must be non-zero
    fn next_below(&mut self, bound: u32) -> u32;

    /// Uniform real in `[low, high)`
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        let value = low + (high - low) * self.next_unit();
        // Rounding can land exactly on `high`
        if value < high {
            value
        } else {
            low
        }
    }
}

/// [`RandomSource`] backed by the standard seedable generator
#[derive(Debug, Clone)]
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    /// Reproducible source for a given seed
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from operating system entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededSource {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_below(&mut self, bound: u32) -> u32 {
        self.rng.gen_range(0..bound)
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }
}
