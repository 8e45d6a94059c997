//! Environment.
use super::{Act, Obs, Step};
use crate::error::KestrelError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observation or action space of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// `n` discrete values, `0..n`.
    Discrete {
        /// Number of values.
        n: usize,
    },

    /// A real vector with element-wise bounds.
    Box {
        /// Lower bounds.
        low: Vec<f32>,

        /// Upper bounds.
        high: Vec<f32>,
    },
}

impl Space {
    /// Creates a discrete space with `n` values.
    pub fn discrete(n: usize) -> Self {
        Self::Discrete { n }
    }

    /// Creates a box space.
    ///
    /// Fails if the bounds differ in length or `low[i] > high[i]` for some `i`.
    pub fn bounded(low: Vec<f32>, high: Vec<f32>) -> Result<Self, KestrelError> {
        if low.len() != high.len() {
            return Err(KestrelError::Configuration(format!(
                "bounds of a box space differ in length: {} and {}",
                low.len(),
                high.len()
            )));
        }
        if low.iter().zip(high.iter()).any(|(l, h)| !(l <= h)) {
            return Err(KestrelError::Configuration(
                "lower bound of a box space exceeds its upper bound".to_string(),
            ));
        }
        Ok(Self::Box { low, high })
    }

    /// Returns `true` for a discrete space.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete { .. })
    }

    /// Size of the flattened representation.
    ///
    /// For a discrete space this is the number of values, used both as the
    /// width of a one-hot encoding and as the number of actions.
    pub fn flat_dim(&self) -> usize {
        match self {
            Self::Discrete { n } => *n,
            Self::Box { low, .. } => low.len(),
        }
    }

    /// Range `high - low` of each dimension. Empty for a discrete space.
    pub fn span(&self) -> Vec<f32> {
        match self {
            Self::Discrete { .. } => vec![],
            Self::Box { low, high } => low.iter().zip(high.iter()).map(|(l, h)| h - l).collect(),
        }
    }

    /// Bounds of a box space.
    pub fn bounds(&self) -> Option<(&[f32], &[f32])> {
        match self {
            Self::Discrete { .. } => None,
            Self::Box { low, high } => Some((low, high)),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete { n } => write!(f, "Discrete({})", n),
            Self::Box { low, .. } => write!(f, "Box({})", low.len()),
        }
    }
}

/// Static description of an environment, queried once when an agent is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Observation space.
    pub observation_space: Space,

    /// Action space.
    pub action_space: Space,
}

impl EnvSpec {
    /// Constructs [`EnvSpec`].
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }
}

impl fmt::Display for EnvSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "obs: {}, act: {}",
            self.observation_space, self.action_space
        )
    }
}

/// Represents an environment, typically an MDP.
///
/// Errors returned from [`Env::reset`] and [`Env::step`] are passed to the
/// caller of the rollout unchanged.
pub trait Env {
    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Returns the observation and action spaces.
    fn spec(&self) -> EnvSpec;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performes an environment step.
    fn step(&mut self, act: &Self::Act) -> Result<Step<Self>>
    where
        Self: Sized;
}
