//! Action-value agent with a target network.
//!
//! The agent keeps an online Q-network and a target copy of it. Transitions
//! handed over by the rollout go to a [`ReplayMemory`](kestrel_core::ReplayMemory);
//! every `learning_frequency` steps a batch is drawn and the online network
//! regresses onto `r + gamma * Q_target(s', a*)`. The target tracks the
//! online network through a [`TargetSynchronizer`](kestrel_core::target_sync::TargetSynchronizer).
mod base;
mod config;
pub use base::ValueAgent;
pub use config::ValueAgentConfig;
