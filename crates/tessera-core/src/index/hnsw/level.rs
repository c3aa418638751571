//! Random level assignment.
//!
//! Levels follow the standard HNSW exponential distribution
//! `floor(-ln(U) / ln(M))`. The random source is injected so tests and
//! benchmarks build reproducible graphs.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt::Debug;

/// Source of node levels.
pub trait LevelGenerator: Send + Sync + Debug {
    /// Draws the level of the next inserted node.
    fn next_level(&self) -> u8;
}

/// Exponential level distribution over a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededLevelGenerator {
    rng: Mutex<StdRng>,
    level_mult: f64,
    max_level: u8,
}

impl SeededLevelGenerator {
    /// Creates a generator for degree `m`, capped at `max_level`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(m: usize, max_level: u8, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            level_mult: 1.0 / (m.max(2) as f64).ln(),
            max_level,
        }
    }

    /// Restarts the sequence from a new seed.
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
    }
}

impl LevelGenerator for SeededLevelGenerator {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next_level(&self) -> u8 {
        // gen() yields [0, 1); flip it so ln() never sees 0.
        let uniform: f64 = 1.0 - self.rng.lock().gen::<f64>();
        let level = (-uniform.ln() * self.level_mult).floor();
        if level >= f64::from(self.max_level) {
            self.max_level
        } else {
            level as u8
        }
    }
}

/// Replays a scripted list of levels, then a constant.
#[derive(Debug, Default)]
pub struct FixedLevels {
    script: Mutex<VecDeque<u8>>,
    fallback: u8,
}

impl FixedLevels {
    /// Hands out `levels` in order, then `fallback` forever.
    #[must_use]
    pub fn new(levels: impl IntoIterator<Item = u8>, fallback: u8) -> Self {
        Self {
            script: Mutex::new(levels.into_iter().collect()),
            fallback,
        }
    }

    /// Every node on level 0.
    #[must_use]
    pub fn flat() -> Self {
        Self::default()
    }
}

impl LevelGenerator for FixedLevels {
    fn next_level(&self) -> u8 {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}
