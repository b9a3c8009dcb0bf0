use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Uniform stream for one trajectory. Two simulations constructed from the
/// same seed draw identical streams regardless of which worker runs them.
pub struct Sampler {
    rng: ChaCha8Rng,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform in (0,1]; open at zero so `-ln` stays finite.
    pub fn generate(&mut self) -> f64 {
        1.0 - self.rng.gen::<f64>()
    }
}
