//! Deterministic actor-critic agent for continuous action spaces.
//!
//! The actor maps observations to actions squashed into the bounds of the
//! action space; the critic estimates the value of observation-action pairs.
//! Both have target copies that track the online networks softly.
//! Exploration adds Ornstein-Uhlenbeck noise to the actor output.
mod base;
mod config;
pub use base::ActorCriticAgent;
pub use config::ActorCriticConfig;
