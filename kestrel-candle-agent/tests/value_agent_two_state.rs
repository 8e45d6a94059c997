use anyhow::Result;
use kestrel_candle_agent::{
    opt::OptimizerConfig,
    value::{ValueAgent, ValueAgentConfig},
    DiscreteAct, FeatureObs,
};
use kestrel_core::{
    exploration::EpsilonGreedyConfig, record::BufferedRecorder, target_sync::TargetSyncConfig,
    Agent, AgentPhase, Env, EnvSpec, KestrelError, Policy, ReplayMemoryConfig, RolloutConfig,
    RolloutProcedure, Space, Step,
};
use ndarray::Array2;
use tempdir::TempDir;

/// Two states, two actions, two steps per episode.
///
/// In state 0, action 0 pays 1. In state 1, action 1 pays 1 and the episode ends.
struct TwoStateEnv {
    s: usize,
}

fn one_hot(s: usize) -> FeatureObs {
    let mut obs = Array2::zeros((1, 2));
    obs[[0, s]] = 1.0;
    FeatureObs(obs)
}

impl Env for TwoStateEnv {
    type Obs = FeatureObs;
    type Act = DiscreteAct;

    fn spec(&self) -> EnvSpec {
        EnvSpec::new(Space::discrete(2), Space::discrete(2))
    }

    fn reset(&mut self) -> Result<FeatureObs> {
        self.s = 0;
        Ok(one_hot(0))
    }

    fn step(&mut self, act: &DiscreteAct) -> Result<Step<Self>> {
        let a = act.0[0] as usize;
        let reward = if a == self.s { 1.0 } else { 0.0 };
        let terminal = self.s == 1;
        self.s = 1 - self.s;
        Ok(Step::new(one_hot(self.s), vec![reward], vec![terminal]))
    }
}

fn config() -> ValueAgentConfig {
    ValueAgentConfig::default()
        .hidden_units(vec![])
        .opt_config(OptimizerConfig::Adam {
            lr: 0.05,
            weight_decay: None,
        })
        .memory(ReplayMemoryConfig::default().capacity(100))
        .exploration(EpsilonGreedyConfig::default().start(1.0).end(0.2).decay(50.0))
        .target_sync(TargetSyncConfig::default().tau(1.0).interval(10))
        .batch_size(8)
        .discount_factor(0.99)
}

#[test]
fn test_learns_two_state_chain() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new("value_agent")?;
    let model_dir = dir.path().join("model");
    let mut env = TwoStateEnv { s: 0 };
    let mut agent = ValueAgent::<TwoStateEnv>::new(config())?;
    let mut recorder = BufferedRecorder::new();
    let mut rollout = RolloutProcedure::new(
        RolloutConfig::default()
            .episodes(100)
            .record_interval(10)
            .model_dir(model_dir.to_string_lossy()),
    )?;

    let summary = rollout.train(&mut agent, &mut env, &mut recorder)?;
    assert_eq!(summary.episodes, 100);
    assert_eq!(summary.steps, 200);
    assert_eq!(agent.state().steps(), 200);
    assert_eq!(agent.memory().len(), 100);
    assert!(!recorder.scalars("loss_critic_mean").is_empty());

    let q0 = agent.q_values(&one_hot(0))?.remove(0);
    let q1 = agent.q_values(&one_hot(1))?.remove(0);
    assert!(q0[0] > q0[1], "{:?}", q0);
    assert!(q1[1] > q1[0], "{:?}", q1);

    let stats = rollout.evaluate(&mut agent, &mut env, 1)?;
    assert_eq!(stats[0].total_return, 2.0);
    assert_eq!(agent.phase(), AgentPhase::Evaluating);
    assert_eq!(agent.state().steps(), 200);

    for name in &["qnet.safetensors", "qnet_tgt.safetensors", "env_spec.yaml"] {
        assert!(model_dir.join("final").join(name).exists(), "{}", name);
    }
    Ok(())
}

#[test]
fn test_save_and_load() -> Result<()> {
    let dir = TempDir::new("value_agent")?;
    let env = TwoStateEnv { s: 0 };
    let mut agent = ValueAgent::<TwoStateEnv>::new(config())?;
    agent.build(&env.spec())?;
    agent.save_params(dir.path())?;

    let mut restored = ValueAgent::<TwoStateEnv>::new(config())?;
    restored.build(&env.spec())?;
    restored.load_params(dir.path())?;
    assert_eq!(restored.q_values(&one_hot(0))?, agent.q_values(&one_hot(0))?);
    assert_eq!(restored.q_values(&one_hot(1))?, agent.q_values(&one_hot(1))?);

    let mut other = ValueAgent::<TwoStateEnv>::new(config())?;
    other.build(&EnvSpec::new(Space::discrete(3), Space::discrete(2)))?;
    let err = other.load_params(dir.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KestrelError>(),
        Some(KestrelError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_build_twice() -> Result<()> {
    let env = TwoStateEnv { s: 0 };
    let mut agent = ValueAgent::<TwoStateEnv>::new(config())?;
    agent.build(&env.spec())?;
    let q = agent.q_values(&one_hot(0))?;
    agent.build(&env.spec())?;
    assert_eq!(agent.q_values(&one_hot(0))?, q);

    let err = agent
        .build(&EnvSpec::new(Space::discrete(2), Space::discrete(3)))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KestrelError>(),
        Some(KestrelError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_unbuilt_agent() -> Result<()> {
    let dir = TempDir::new("value_agent")?;
    let mut agent = ValueAgent::<TwoStateEnv>::new(config())?;
    assert_eq!(agent.phase(), AgentPhase::Unbuilt);

    let err = agent.sample(&one_hot(0)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KestrelError>(),
        Some(KestrelError::MissingEnvironment)
    ));
    assert!(agent.update().is_err());
    assert!(agent.save_params(dir.path()).is_err());
    Ok(())
}

#[test]
fn test_greedy_in_evaluation() -> Result<()> {
    let env = TwoStateEnv { s: 0 };
    let mut agent = ValueAgent::<TwoStateEnv>::new(config())?;
    agent.build(&env.spec())?;
    agent.eval();

    let q = agent.q_values(&one_hot(1))?[0].clone();
    let greedy = if q[1] > q[0] { 1 } else { 0 };
    for _ in 0..10 {
        assert_eq!(agent.sample(&one_hot(1))?, DiscreteAct(vec![greedy]));
    }
    assert_eq!(agent.state().steps(), 0);
    Ok(())
}
