//! Random number generation for sowing and propagation.
//!
//! Every iteration draws from its own generator derived from the run's base
//! seed, so a run resumed from a checkpoint replays exactly what an
//! uninterrupted run would have produced.

use rand::prelude::*;

use crate::schema::{CandidateValue, ParameterSpace};

/// Random number generator wrapper for seed operations.
pub struct SeedRng {
    rng: StdRng,
}

impl SeedRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator for one iteration of a run.
    pub fn for_iteration(base_seed: u64, iteration: usize) -> Self {
        let mixed = splitmix64(base_seed ^ splitmix64(iteration as u64));
        Self::new(mixed)
    }

    /// Sample every dimension of the space at random.
    pub fn random_vector(&mut self, space: &ParameterSpace) -> Vec<CandidateValue> {
        space
            .specs()
            .map(|spec| spec.sample_random(&mut self.rng))
            .collect()
    }

    /// Perturb every dimension of a parent vector.
    pub fn perturb_vector(
        &mut self,
        space: &ParameterSpace,
        parent: &[CandidateValue],
    ) -> Vec<CandidateValue> {
        space
            .specs()
            .zip(parent)
            .map(|(spec, value)| spec.perturb(value, &mut self.rng))
            .collect()
    }

    /// Generate next u64, e.g. for a run's base seed.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// SplitMix64 finalizer.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
