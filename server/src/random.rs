//! `rand`-backed randomness for live battles.

use catbattle_shared::RandomSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform rolls from a `StdRng`, seeded from entropy or a fixed seed.
pub struct GameRng {
    rng: StdRng,
}

impl GameRng {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_config(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for GameRng {
    fn next_f64(&mut self) -> f64 {
        // gen::<f64>() samples [0, 1)
        self.rng.gen::<f64>()
    }
}
