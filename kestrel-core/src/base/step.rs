//! Environment step.
use super::Env;

/// Represents the outcome of an environment step: the next observation,
/// rewards and termination flags of every sub-environment.
pub struct Step<E: Env> {
    /// Observation.
    pub obs: E::Obs,

    /// Reward.
    pub reward: Vec<f32>,

    /// Flag denoting if episode is terminated.
    pub is_terminated: Vec<bool>,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(obs: E::Obs, reward: Vec<f32>, is_terminated: Vec<bool>) -> Self {
        Step {
            obs,
            reward,
            is_terminated,
        }
    }

    #[inline]
    /// Returns `true` if all sub-environments are terminated.
    pub fn is_done(&self) -> bool {
        self.is_terminated.iter().all(|&t| t)
    }
}
