//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`value::ValueAgent`] - action-value learning with a target network
//! * [`actor_critic::ActorCriticAgent`] - deterministic policy gradient
//! * [`evolution::EvolutionAgent`] - evolution strategies
pub mod actor_critic;
pub mod evolution;
pub mod mlp;
pub mod model;
mod obs_act;
pub mod opt;
pub mod util;
pub mod value;
use anyhow::Result;
pub use obs_act::{ContinuousAct, DiscreteAct, FeatureObs, PolicyAct};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    /// Creates the corresponding [`candle_core::Device`].
    pub fn build(&self) -> Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => Ok(candle_core::Device::new_cuda(*n)?),
        }
    }
}

/// Activation function applied to the output layer.
#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
pub enum Activation {
    /// Identity.
    None,

    /// ReLU.
    ReLU,

    /// Hyperbolic tangent, for outputs bounded to `[-1, 1]`.
    Tanh,
}

impl Activation {
    /// Applies the activation function.
    pub fn forward(&self, xs: &candle_core::Tensor) -> candle_core::Result<candle_core::Tensor> {
        match self {
            Self::None => Ok(xs.clone()),
            Self::ReLU => xs.relu(),
            Self::Tanh => xs.tanh(),
        }
    }
}
