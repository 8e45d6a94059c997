use anyhow::Result;
use kestrel_candle_agent::{
    evolution::{EvolutionAgent, EvolutionConfig},
    ContinuousAct, FeatureObs,
};
use kestrel_core::{
    record::BufferedRecorder, Agent, AgentKind, Env, EnvSpec, RolloutConfig, RolloutProcedure,
    Space, Step,
};
use ndarray::array;
use tempdir::TempDir;

/// One-step bandit paying `-(a - 0.5)^2`.
struct Bandit;

impl Env for Bandit {
    type Obs = FeatureObs;
    type Act = ContinuousAct;

    fn spec(&self) -> EnvSpec {
        EnvSpec::new(
            Space::bounded(vec![0.0], vec![1.0]).unwrap(),
            Space::bounded(vec![-1.0], vec![1.0]).unwrap(),
        )
    }

    fn reset(&mut self) -> Result<FeatureObs> {
        Ok(FeatureObs(array![[1.0]]))
    }

    fn step(&mut self, act: &ContinuousAct) -> Result<Step<Self>> {
        let a = act.0[[0, 0]];
        let reward = -(a - 0.5) * (a - 0.5);
        Ok(Step::new(FeatureObs(array![[1.0]]), vec![reward], vec![true]))
    }
}

#[test]
fn test_evolution_on_bandit() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new("evolution")?;
    let model_dir = dir.path().join("model");
    let config = EvolutionConfig::default()
        .hidden_units(vec![])
        .population_size(20)
        .sigma(0.1)
        .learning_rate(0.03);
    let mut agent = EvolutionAgent::<Bandit>::new(config)?;
    assert_eq!(Agent::<Bandit>::kind(&agent), AgentKind::Evolution);
    let mut env = Bandit;
    let mut recorder = BufferedRecorder::new();
    let mut rollout = RolloutProcedure::new(
        RolloutConfig::default()
            .episodes(2000)
            .record_interval(20)
            .model_dir(model_dir.to_string_lossy()),
    )?;

    let summary = rollout.train(&mut agent, &mut env, &mut recorder)?;
    assert_eq!(summary.episodes, 2000);
    assert_eq!(agent.state().updates(), 100);
    assert_eq!(agent.evaluated(), 0);
    assert_eq!(recorder.scalars("fitness_mean").len(), 100);

    let stats = rollout.evaluate(&mut agent, &mut env, 1)?;
    assert!(stats[0].total_return > -0.04, "{:?}", stats[0]);

    // Only the center policy is saved.
    let mut restored = EvolutionAgent::<Bandit>::new(EvolutionConfig::default().hidden_units(vec![]))?;
    restored.build(&env.spec())?;
    restored.load_params(&model_dir.join("final"))?;
    let stats_ = rollout.evaluate(&mut restored, &mut env, 1)?;
    assert_eq!(stats_[0].total_return, stats[0].total_return);
    Ok(())
}
