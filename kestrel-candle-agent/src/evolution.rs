//! Evolution strategies agent.
//!
//! A population of perturbed copies of a center policy is evaluated one
//! episode per member. Once every member has a fitness, the center moves
//! along the rank-weighted average of the perturbations.
mod base;
mod config;
pub use base::EvolutionAgent;
pub use config::EvolutionConfig;
