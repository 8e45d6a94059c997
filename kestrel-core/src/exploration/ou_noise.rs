//! Ornstein-Uhlenbeck process.
use super::ExplorationSchedule;
use crate::error::KestrelError;
use anyhow::Result;
use log::debug;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`OrnsteinUhlenbeck`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct OrnsteinUhlenbeckConfig {
    /// Mean-reversion rate.
    pub theta: f32,

    /// Long-run mean.
    pub mu: f32,

    /// Volatility. When `None`, the mean span of the action space is used.
    #[serde(default)]
    pub sigma: Option<f32>,

    /// Seed of the RNG.
    pub seed: u64,
}

impl Default for OrnsteinUhlenbeckConfig {
    fn default() -> Self {
        Self {
            theta: 0.15,
            mu: 0.0,
            sigma: None,
            seed: 42,
        }
    }
}

impl OrnsteinUhlenbeckConfig {
    /// Sets the mean-reversion rate.
    pub fn theta(mut self, v: f32) -> Self {
        self.theta = v;
        self
    }

    /// Sets the long-run mean.
    pub fn mu(mut self, v: f32) -> Self {
        self.mu = v;
        self
    }

    /// Sets the volatility explicitly.
    pub fn sigma(mut self, v: f32) -> Self {
        self.sigma = Some(v);
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`OrnsteinUhlenbeckConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`OrnsteinUhlenbeckConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Temporally correlated noise `x <- x + theta * (mu - x) + sigma * N(0, 1)`.
///
/// The state persists across episodes until [`OrnsteinUhlenbeck::reset`]
/// is called.
#[derive(Debug, Clone)]
pub struct OrnsteinUhlenbeck {
    theta: f32,
    mu: f32,
    sigma: f32,
    x: Vec<f32>,
    rng: StdRng,
}

impl OrnsteinUhlenbeck {
    /// Builds the process for an action space with the given per-dimension span.
    ///
    /// The dimension of the noise equals `span.len()`. Fails if
    /// `theta <= 0` or `sigma < 0`.
    pub fn build(config: &OrnsteinUhlenbeckConfig, span: &[f32]) -> Result<Self, KestrelError> {
        let sigma = match config.sigma {
            Some(sigma) => sigma,
            None if span.is_empty() => 0.0,
            None => span.iter().sum::<f32>() / span.len() as f32,
        };
        if !(config.theta > 0.0) {
            return Err(KestrelError::Configuration(format!(
                "theta of an Ornstein-Uhlenbeck process must be positive, got {}",
                config.theta
            )));
        }
        if !(sigma >= 0.0) {
            return Err(KestrelError::Configuration(format!(
                "sigma of an Ornstein-Uhlenbeck process must be non-negative, got {}",
                sigma
            )));
        }
        debug!(
            "Ornstein-Uhlenbeck process: theta={}, mu={}, sigma={}",
            config.theta, config.mu, sigma
        );

        Ok(Self {
            theta: config.theta,
            mu: config.mu,
            sigma,
            x: vec![config.mu; span.len()],
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Advances the process one step and returns the new state.
    pub fn sample(&mut self) -> Vec<f32> {
        for x in self.x.iter_mut() {
            let n: f32 = StandardNormal.sample(&mut self.rng);
            *x += self.theta * (self.mu - *x) + self.sigma * n;
        }
        self.x.clone()
    }

    /// Resets the state to the mean.
    pub fn reset(&mut self) {
        let mu = self.mu;
        self.x.iter_mut().for_each(|x| *x = mu);
    }

    /// Current state.
    pub fn state(&self) -> &[f32] {
        &self.x
    }

    /// Volatility in use.
    pub fn sigma(&self) -> f32 {
        self.sigma
    }
}

impl ExplorationSchedule for OrnsteinUhlenbeck {
    type Control = Vec<f32>;

    /// The process does not depend on the step counter.
    fn next(&mut self, _step: usize) -> Vec<f32> {
        self.sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigma_from_span() {
        let ou = OrnsteinUhlenbeck::build(&Default::default(), &[2.0, 4.0]).unwrap();
        assert_eq!(ou.sigma(), 3.0);
        assert_eq!(ou.state(), &[0.0, 0.0]);

        let ou = OrnsteinUhlenbeck::build(&OrnsteinUhlenbeckConfig::default().sigma(0.2), &[2.0])
            .unwrap();
        assert_eq!(ou.sigma(), 0.2);
    }

    #[test]
    fn test_invalid() {
        let config = OrnsteinUhlenbeckConfig::default();
        assert!(OrnsteinUhlenbeck::build(&config.clone().theta(0.0), &[1.0]).is_err());
        assert!(OrnsteinUhlenbeck::build(&config.clone().theta(-0.1), &[1.0]).is_err());
        assert!(OrnsteinUhlenbeck::build(&config.sigma(-1.0), &[1.0]).is_err());
    }

    #[test]
    fn test_mean_reversion_without_noise() {
        let config = OrnsteinUhlenbeckConfig::default()
            .theta(0.5)
            .mu(1.0)
            .sigma(0.0);
        let mut ou = OrnsteinUhlenbeck::build(&config, &[1.0]).unwrap();
        ou.x = vec![3.0];
        assert_eq!(ou.next(0), vec![2.0]);
        assert_eq!(ou.next(1), vec![1.5]);
    }

    #[test]
    fn test_state_persists_until_reset() {
        let config = OrnsteinUhlenbeckConfig::default().sigma(1.0).seed(3);
        let mut ou = OrnsteinUhlenbeck::build(&config, &[1.0, 1.0]).unwrap();
        let x1 = ou.sample();
        assert_eq!(ou.state(), &x1[..]);
        let x2 = ou.sample();
        assert_ne!(x1, x2);
        ou.reset();
        assert_eq!(ou.state(), &[0.0, 0.0]);
    }

    #[test]
    fn test_seeded() {
        let config = OrnsteinUhlenbeckConfig::default().sigma(0.3).seed(11);
        let mut a = OrnsteinUhlenbeck::build(&config, &[1.0; 3]).unwrap();
        let mut b = OrnsteinUhlenbeck::build(&config, &[1.0; 3]).unwrap();
        for _ in 0..10 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
