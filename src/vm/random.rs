//! RandomStream - The single seeded random source of a run
//!
//! Every stochastic decision the hardware makes (thread selection under
//! virulence, copy mutations, divide mutations, failure coin-flips) draws
//! from one stream. Draw order is observable: replaying a seed only
//! reproduces a trajectory if every call site draws in the same order.
//!
//! ```text
//! double()      → one draw, uniform in [0, 1)
//! p(prob)       → one draw, true when double() < prob
//! uint(n)       → one draw, uniform in [0, n)
//! binomial(n,p) → n draws of p(), zero draws when p <= 0
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random stream shared by the hardware of one run
#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: StdRng,
    draws: u64,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), draws: 0 }
    }

    /// Uniform in [0, 1)
    pub fn double(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    /// Bernoulli trial
    pub fn p(&mut self, prob: f64) -> bool {
        self.double() < prob
    }

    /// Uniform in [0, n); `n == 0` yields 0 and still consumes a draw
    pub fn uint(&mut self, n: usize) -> usize {
        self.draws += 1;
        if n == 0 {
            let _ = self.rng.gen::<u32>();
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    /// Number of successes in `n` trials of probability `prob`
    pub fn binomial(&mut self, n: usize, prob: f64) -> usize {
        if prob <= 0.0 {
            return 0;
        }
        (0..n).filter(|_| self.p(prob)).count()
    }

    /// Total draws taken so far
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
