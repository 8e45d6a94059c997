//! Lifecycle state shared by all agents.
use super::EnvSpec;
use crate::error::KestrelError;
use anyhow::Result;
use log::info;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

const SPEC_FILE: &str = "env_spec.yaml";

/// Lifecycle phase of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Not built against an environment yet.
    Unbuilt,

    /// Built, but neither training nor evaluation mode has been selected.
    Built,

    /// Training mode. Exploration and updates are enabled.
    Training,

    /// Evaluation mode. Actions are always greedy.
    Evaluating,

    /// Training was stopped.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Train,
    Eval,
}

/// Counters, flags and the environment spec an agent was built for.
///
/// Every agent owns one of these. Keeping the counters here, instead of in
/// process-wide state, lets several agents train side by side.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    spec: Option<EnvSpec>,
    mode: Option<Mode>,
    end_training: bool,
    steps: usize,
    episodes: usize,
    updates: usize,
}

impl AgentState {
    /// Creates the state of an unbuilt agent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the environment spec.
    ///
    /// Returns `Ok(true)` on the first call and `Ok(false)` when the agent is
    /// already built for the same spec. A different spec is a
    /// [`KestrelError::ShapeMismatch`].
    pub fn build(&mut self, spec: &EnvSpec) -> Result<bool, KestrelError> {
        match &self.spec {
            None => {
                info!("Build agent for {}", spec);
                self.spec = Some(spec.clone());
                Ok(true)
            }
            Some(_) => {
                self.check_spec(spec)?;
                Ok(false)
            }
        }
    }

    /// Returns `true` if [`AgentState::build`] has been called.
    pub fn is_built(&self) -> bool {
        self.spec.is_some()
    }

    /// Returns the spec the agent was built for.
    pub fn spec(&self) -> Result<&EnvSpec, KestrelError> {
        self.spec.as_ref().ok_or(KestrelError::MissingEnvironment)
    }

    /// Fails with [`KestrelError::ShapeMismatch`] if `spec` differs from the built one.
    pub fn check_spec(&self, spec: &EnvSpec) -> Result<(), KestrelError> {
        let built = self.spec()?;
        if built != spec {
            return Err(KestrelError::ShapeMismatch {
                expected: built.to_string(),
                found: spec.to_string(),
            });
        }
        Ok(())
    }

    /// Writes the built spec as `env_spec.yaml` in `dir`.
    pub fn save_spec(&self, dir: &Path) -> Result<()> {
        let spec = self.spec()?;
        let mut file = File::create(dir.join(SPEC_FILE))?;
        file.write_all(serde_yaml::to_string(spec)?.as_bytes())?;
        Ok(())
    }

    /// Reads `env_spec.yaml` from `dir` and checks it against the built spec.
    pub fn check_saved_spec(&self, dir: &Path) -> Result<()> {
        self.spec()?;
        let file = File::open(dir.join(SPEC_FILE))?;
        let rdr = BufReader::new(file);
        let saved: EnvSpec = serde_yaml::from_reader(rdr)?;
        Ok(self.check_spec(&saved)?)
    }

    /// Returns the current phase.
    pub fn phase(&self) -> AgentPhase {
        if self.spec.is_none() {
            AgentPhase::Unbuilt
        } else if self.end_training {
            AgentPhase::Done
        } else {
            match self.mode {
                None => AgentPhase::Built,
                Some(Mode::Train) => AgentPhase::Training,
                Some(Mode::Eval) => AgentPhase::Evaluating,
            }
        }
    }

    /// Selects training mode.
    pub fn train(&mut self) {
        self.mode = Some(Mode::Train);
    }

    /// Selects evaluation mode.
    pub fn eval(&mut self) {
        self.mode = Some(Mode::Eval);
    }

    /// Returns `true` in training mode.
    pub fn is_train(&self) -> bool {
        self.mode == Some(Mode::Train)
    }

    /// Raises the end-of-training flag.
    pub fn stop(&mut self) {
        if !self.end_training {
            info!("Stop training after {} steps", self.steps);
        }
        self.end_training = true;
    }

    /// Returns `true` once training was stopped.
    pub fn end_training(&self) -> bool {
        self.end_training
    }

    /// Number of environment steps taken in training mode.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Increments the step counter.
    pub fn tick_step(&mut self) {
        self.steps += 1;
    }

    /// Number of finished episodes.
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Increments the episode counter.
    pub fn tick_episode(&mut self) {
        self.episodes += 1;
    }

    /// Number of optimization steps.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Increments the optimization step counter.
    pub fn tick_update(&mut self) {
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Space;

    fn spec(n: usize) -> EnvSpec {
        EnvSpec::new(Space::discrete(n), Space::discrete(2))
    }

    #[test]
    fn test_phases() {
        let mut state = AgentState::new();
        assert_eq!(state.phase(), AgentPhase::Unbuilt);
        assert_eq!(state.spec(), Err(KestrelError::MissingEnvironment));

        assert_eq!(state.build(&spec(3)), Ok(true));
        assert_eq!(state.phase(), AgentPhase::Built);
        state.train();
        assert_eq!(state.phase(), AgentPhase::Training);
        state.eval();
        assert_eq!(state.phase(), AgentPhase::Evaluating);
        state.stop();
        assert_eq!(state.phase(), AgentPhase::Done);
    }

    #[test]
    fn test_rebuild() {
        let mut state = AgentState::new();
        state.build(&spec(3)).unwrap();
        assert_eq!(state.build(&spec(3)), Ok(false));
        assert!(matches!(
            state.build(&spec(4)),
            Err(KestrelError::ShapeMismatch { .. })
        ));
        assert_eq!(state.spec().unwrap(), &spec(3));
    }

    #[test]
    fn test_saved_spec() -> Result<()> {
        let dir = tempdir::TempDir::new("agent_state")?;
        let mut state = AgentState::new();
        state.build(&spec(3))?;
        state.save_spec(dir.path())?;
        state.check_saved_spec(dir.path())?;

        let mut other = AgentState::new();
        other.build(&spec(5))?;
        let err = other.check_saved_spec(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KestrelError>(),
            Some(KestrelError::ShapeMismatch { .. })
        ));
        Ok(())
    }
}
