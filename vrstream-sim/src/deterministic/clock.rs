//! Time control and random number generation for deterministic simulations.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vrstream_core::SimTime;

use super::simulation::SimulationError;

/// Simulation clock measured from time zero.
///
/// Time only moves forward and is independent of wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    current_time: SimTime,
}

impl SimClock {
    /// Creates a clock at simulation time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Advances simulation time to `target`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidEventScheduling` - If target time is in the past
    pub fn advance_to(&mut self, target: SimTime) -> Result<(), SimulationError> {
        if target < self.current_time {
            return Err(SimulationError::InvalidEventScheduling {
                reason: format!(
                    "cannot move clock back from {:?} to {:?}",
                    self.current_time, target
                ),
            });
        }
        self.current_time = target;
        Ok(())
    }
}

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 for fast, seed-reproducible pseudorandom numbers.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        // 53 random mantissa bits keep the result strictly below 1.0
        (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generates random boolean with given probability.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.random_f64() < probability
    }
}
