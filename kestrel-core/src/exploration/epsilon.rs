//! Exponentially decaying epsilon schedule.
use super::ExplorationSchedule;
use crate::error::KestrelError;
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Added to `decay` so that a zero decay does not divide by zero.
const DIVIDE_BY_ZERO_SAFETY: f64 = 1e-10;

/// Configuration of [`EpsilonGreedy`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct EpsilonGreedyConfig {
    /// Epsilon at step 0.
    pub start: f64,

    /// Asymptotic epsilon.
    pub end: f64,

    /// Time constant of the decay in steps.
    pub decay: f64,

    /// Seed of the RNG used by [`EpsilonGreedy::sample`].
    pub seed: u64,
}

impl Default for EpsilonGreedyConfig {
    fn default() -> Self {
        Self {
            start: 0.99,
            end: 0.04,
            decay: 10000.,
            seed: 42,
        }
    }
}

impl EpsilonGreedyConfig {
    /// Sets epsilon at step 0.
    pub fn start(mut self, v: f64) -> Self {
        self.start = v;
        self
    }

    /// Sets the asymptotic epsilon.
    pub fn end(mut self, v: f64) -> Self {
        self.end = v;
        self
    }

    /// Sets the time constant of the decay.
    pub fn decay(mut self, v: f64) -> Self {
        self.decay = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`EpsilonGreedyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EpsilonGreedyConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Epsilon schedule `end + (start - end) * exp(-t / decay)`.
///
/// [`EpsilonGreedy::sample`] reports `true` when a uniform draw exceeds
/// `epsilon(t)`. An agent takes the greedy action in that case, so the
/// probability of acting greedily is `1 - epsilon(t)` and grows as epsilon
/// decays.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    start: f64,
    end: f64,
    decay: f64,
    rng: StdRng,
}

impl EpsilonGreedy {
    /// Builds the schedule.
    ///
    /// Fails unless `0 <= end <= start` and `decay >= 0`.
    pub fn build(config: &EpsilonGreedyConfig) -> Result<Self, KestrelError> {
        let EpsilonGreedyConfig {
            start, end, decay, ..
        } = *config;
        if !(start.is_finite() && end.is_finite() && decay.is_finite()) {
            return Err(KestrelError::Configuration(
                "epsilon schedule parameters must be finite".to_string(),
            ));
        }
        if !(0.0 <= end && end <= start) {
            return Err(KestrelError::Configuration(format!(
                "epsilon schedule requires 0 <= end <= start, got start={}, end={}",
                start, end
            )));
        }
        if decay < 0.0 {
            return Err(KestrelError::Configuration(format!(
                "epsilon decay must be non-negative, got {}",
                decay
            )));
        }

        Ok(Self {
            start,
            end,
            decay,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Epsilon at step `t`.
    pub fn epsilon(&self, t: usize) -> f64 {
        self.end
            + (self.start - self.end) * (-(t as f64) / (self.decay + DIVIDE_BY_ZERO_SAFETY)).exp()
    }

    /// Returns `true` if a uniform draw in `[0, 1)` exceeds `epsilon(t)`.
    ///
    /// Always `false` at `t == 0`, before any step was taken.
    pub fn sample(&mut self, t: usize) -> bool {
        if t == 0 {
            return false;
        }
        self.rng.gen::<f64>() > self.epsilon(t)
    }
}

impl ExplorationSchedule for EpsilonGreedy {
    type Control = f64;

    fn next(&mut self, step: usize) -> f64 {
        self.epsilon(step)
    }
}
