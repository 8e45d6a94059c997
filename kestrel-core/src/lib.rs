#![warn(missing_docs)]
//! Agent training infrastructure for reinforcement learning.
//!
//! This crate holds the parts of a training loop that do not depend on a
//! particular model backend or environment: a bounded [`ReplayMemory`],
//! exploration schedules, target-model synchronization, the [`Agent`]
//! capability set and the [`RolloutProcedure`] that drives an agent
//! through episodes.
pub mod error;
pub mod exploration;
pub mod record;
pub mod replay_memory;
pub mod target_sync;

mod base;
pub use base::{
    Act, Agent, AgentKind, AgentPhase, AgentState, ActItem, Env, EnvSpec, Obs, ObsItem, Policy,
    Space, Step,
};

mod rollout;
pub use rollout::{
    EpisodeStats, RolloutConfig, RolloutProcedure, StatisticCollection, StopToken,
    TrainingSummary,
};

pub use error::KestrelError;
pub use replay_memory::{ReplayMemory, ReplayMemoryConfig, Transition};
