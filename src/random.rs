use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniformly distributed values in [0, 1) used to initialize weights
pub trait RandomSource {
    fn next_double(&mut self) -> f64;
}

impl<R: Rng> RandomSource for R {
    fn next_double(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Deterministic source for reproducible runs
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Replays a fixed sequence, wrapping around. Handy for pinning exact weights.
#[derive(Debug, Clone)]
pub struct Sequence {
    values: Vec<f64>,
    idx: usize,
}

impl Sequence {
    pub fn new(values: Vec<f64>) -> Self {
        Sequence { values, idx: 0 }
    }
}

impl RandomSource for Sequence {
    fn next_double(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.idx % self.values.len()];
        self.idx += 1;
        v
    }
}
