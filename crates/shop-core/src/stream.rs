//! Deterministic pseudo-random stream for simulation decisions.
//!
//! A linear congruential recurrence (`s' = (s * 9301 + 49297) mod 233280`).
//! Low quality and not cryptographically secure; what matters is that a seed
//! string reproduces an identical run. The stream is a plain `Copy` value so
//! callers thread it explicitly instead of sharing ambient state.

use serde::{Deserialize, Serialize};

const MULTIPLIER: u64 = 9301;
const INCREMENT: u64 = 49297;
const MODULUS: u64 = 233_280;

/// Seedable LCG stream. Every draw advances the state by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    state: u64,
}

impl Stream {
    /// Create a stream from an integer seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % MODULUS,
        }
    }

    /// Seed from an arbitrary string, or from OS entropy when `None`.
    pub fn from_seed(seed: Option<&str>) -> Self {
        match seed {
            Some(s) => Self::new(hash_seed(s)),
            None => Self::new(rand::random::<u64>()),
        }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state * MULTIPLIER + INCREMENT) % MODULUS;
        self.state as f64 / MODULUS as f64
    }

    /// Uniform value in `[min, max)`.
    pub fn between(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }

    /// Integer in `[min, max)`; returns `min` when the range is empty.
    pub fn range_usize(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        let v = self.between(min as f64, max as f64).floor() as usize;
        v.min(max - 1)
    }

    /// Returns `true` with the given probability.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Pick one element. An empty slice yields `None` and consumes no draw.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = (self.next_f64() * items.len() as f64).floor() as usize;
        items.get(idx.min(items.len() - 1))
    }

    /// Raw generator state, for snapshots and session ids.
    pub fn state(&self) -> u64 {
        self.state
    }
}

/// Rolling polynomial hash (base 31) of a seed string.
pub fn hash_seed(seed: &str) -> u64 {
    seed.bytes().fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32)) as u64
}
