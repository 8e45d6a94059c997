//! Exploration schedules.
//!
//! * [`EpsilonGreedy`] maps the step counter to an epsilon value for
//!   discrete action spaces.
//! * [`OrnsteinUhlenbeck`] produces temporally correlated noise for
//!   continuous action spaces.
mod epsilon;
mod ou_noise;
pub use epsilon::{EpsilonGreedy, EpsilonGreedyConfig};
pub use ou_noise::{OrnsteinUhlenbeck, OrnsteinUhlenbeckConfig};

/// Maps the step counter to an exploration control value.
pub trait ExplorationSchedule {
    /// Control value, e.g. epsilon or a noise vector.
    type Control;

    /// Returns the control value at `step`.
    fn next(&mut self, step: usize) -> Self::Control;
}
