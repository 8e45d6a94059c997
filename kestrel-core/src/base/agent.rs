//! Agent.
use super::{ActItem, AgentPhase, AgentState, Env, EnvSpec, ObsItem, Policy};
use crate::{record::Record, replay_memory::Transition, rollout::EpisodeStats};
use anyhow::Result;
use std::path::Path;

/// Variant tag of an agent.
///
/// [`RolloutProcedure`](crate::RolloutProcedure) dispatches on this tag to
/// decide whether transitions are stored and how often `update` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Learns an action-value function from replayed transitions.
    Value,

    /// Learns a deterministic policy and a critic from replayed transitions.
    ActorCritic,

    /// Evolves policy parameters from episode returns.
    Evolution,
}

impl AgentKind {
    /// Returns `true` if transitions of this kind of agent go to a replay memory.
    pub fn stores_transitions(&self) -> bool {
        !matches!(self, Self::Evolution)
    }

    /// Returns `true` if `update` is called after every environment step,
    /// `false` if it is called once per rollout.
    pub fn updates_per_step(&self) -> bool {
        !matches!(self, Self::Evolution)
    }
}

/// Represents a trainable policy on an environment.
///
/// Lifecycle: `Unbuilt -> Built -> {Training, Evaluating} -> Done`, tracked
/// by the [`AgentState`] every implementor owns. Operations other than
/// [`Agent::build`] and the mode switches fail with
/// [`KestrelError::MissingEnvironment`](crate::KestrelError::MissingEnvironment)
/// on an unbuilt agent.
pub trait Agent<E: Env>: Policy<E> {
    /// Variant of the agent.
    fn kind(&self) -> AgentKind;

    /// Lifecycle state.
    fn state(&self) -> &AgentState;

    /// Mutable lifecycle state.
    fn state_mut(&mut self) -> &mut AgentState;

    /// Infers input and output shapes from `spec` and constructs models.
    ///
    /// Calling it again with the same spec is a no-op; a different spec is a
    /// [`KestrelError::ShapeMismatch`](crate::KestrelError::ShapeMismatch).
    fn build(&mut self, spec: &EnvSpec) -> Result<()>;

    /// Hands a transition to the agent, typically pushing it into a replay memory.
    fn observe(&mut self, transition: Transition<ObsItem<E>, ActItem<E>>) -> Result<()>;

    /// Performs an optimization step.
    ///
    /// Returns `Ok(None)` without touching any parameter when there is not
    /// enough data yet, for example during a warmup period.
    fn update(&mut self) -> Result<Option<Record>>;

    /// Notifies the end of an episode.
    fn end_episode(&mut self, _stats: &EpisodeStats) -> Result<()> {
        self.state_mut().tick_episode();
        Ok(())
    }

    /// Set the policy to training mode.
    fn train(&mut self) {
        self.state_mut().train();
    }

    /// Set the policy to evaluation mode.
    fn eval(&mut self) {
        self.state_mut().eval();
    }

    /// Return if it is in training mode.
    fn is_train(&self) -> bool {
        self.state().is_train()
    }

    /// Returns the lifecycle phase.
    fn phase(&self) -> AgentPhase {
        self.state().phase()
    }

    /// Requests the end of training. Checked at episode boundaries.
    fn stop_training(&mut self) {
        self.state_mut().stop();
    }

    /// Returns `true` once training was requested to end.
    fn end_training(&self) -> bool {
        self.state().end_training()
    }

    /// Save the parameters of the agent in the given directory.
    ///
    /// This method commonly creates a number of files in the directory,
    /// one for each model. Online and target models are both saved.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Load the parameters of the agent from the given directory.
    ///
    /// The agent must be built. The spec stored with the parameters must
    /// equal the spec the agent was built for.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
