use super::ValueAgentConfig;
use crate::{
    mlp::{Mlp, MlpConfig},
    model::Model,
    opt::Optimizer,
    util::rows_to_tensor,
    Activation, DiscreteAct, FeatureObs, PolicyAct,
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use kestrel_core::{
    exploration::{EpsilonGreedy, ExplorationSchedule},
    record::{Record, RecordValue},
    target_sync::{sync, TargetSynchronizer},
    Agent, AgentKind, AgentState, Env, EnvSpec, KestrelError, Policy, ReplayMemory, Transition,
};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, marker::PhantomData, path::Path};

struct QNets {
    qnet: Model<Mlp>,
    qnet_tgt: Model<Mlp>,
    opt: Optimizer,
    obs_dim: usize,
    n_actions: usize,
}

/// Action-value agent for discrete action spaces.
///
/// Networks are created by [`Agent::build`], when the observation width and
/// the number of actions are known from the [`EnvSpec`].
pub struct ValueAgent<E> {
    config: ValueAgentConfig,
    state: AgentState,
    memory: ReplayMemory<Vec<f32>, i64>,
    explorer: EpsilonGreedy,
    synchronizer: TargetSynchronizer,
    nets: Option<QNets>,
    device: Device,
    rng: StdRng,
    phantom: PhantomData<E>,
}

impl<E> ValueAgent<E>
where
    E: Env<Obs = FeatureObs, Act = DiscreteAct>,
{
    /// Constructs an unbuilt agent.
    ///
    /// Fails with [`KestrelError::Configuration`] on an invalid configuration.
    pub fn new(config: ValueAgentConfig) -> Result<Self> {
        config.validate()?;
        let memory = ReplayMemory::build(&config.memory)?;
        let explorer = EpsilonGreedy::build(&config.exploration)?;
        let synchronizer = TargetSynchronizer::new(&config.target_sync)?;
        let device = config.device.build()?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            state: AgentState::new(),
            memory,
            explorer,
            synchronizer,
            nets: None,
            device,
            rng,
            phantom: PhantomData,
        })
    }

    /// The replay memory.
    pub fn memory(&self) -> &ReplayMemory<Vec<f32>, i64> {
        &self.memory
    }

    /// Epsilon at the current step.
    pub fn epsilon(&self) -> f64 {
        self.explorer.epsilon(self.state.steps())
    }

    /// Action values of the online network, one row per observation.
    pub fn q_values(&self, obs: &FeatureObs) -> Result<Vec<Vec<f32>>> {
        let nets = self.nets()?;
        check_obs_dim(obs, nets.obs_dim)?;
        let q = nets.qnet.forward(&obs.to_tensor(&self.device)?)?;
        Ok(q.to_vec2::<f32>()?)
    }

    fn nets(&self) -> Result<&QNets, KestrelError> {
        self.nets.as_ref().ok_or(KestrelError::MissingEnvironment)
    }

    fn update_critic(&mut self) -> Result<Option<f32>> {
        let nets = self.nets.as_mut().ok_or(KestrelError::MissingEnvironment)?;

        let (obs, act, reward, next_obs, terminal) = {
            let batch = match self.memory.sample(self.config.batch_size) {
                Ok(batch) => batch,
                Err(KestrelError::InsufficientData { .. }) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let n = batch.len();
            let obs = rows_to_tensor(
                batch.iter().map(|t| t.state().as_slice()),
                nets.obs_dim,
                &self.device,
            )?;
            let next_obs = rows_to_tensor(
                batch.iter().map(|t| t.next_state().as_slice()),
                nets.obs_dim,
                &self.device,
            )?;
            let act = batch.iter().map(|t| *t.action() as u32).collect::<Vec<_>>();
            let act = Tensor::from_vec(act, (n, 1), &self.device)?;
            let reward = batch.iter().map(|t| t.reward()).collect::<Vec<_>>();
            let reward = Tensor::from_vec(reward, n, &self.device)?;
            let terminal = batch.iter().map(|t| t.terminal() as u8).collect::<Vec<_>>();
            let terminal = Tensor::from_vec(terminal, n, &self.device)?;
            (obs, act, reward, next_obs, terminal)
        };

        let pred = nets
            .qnet
            .forward(&obs)?
            .gather(&act, D::Minus1)?
            .squeeze(D::Minus1)?;

        let tgt = {
            let next_q = if self.config.double_dqn {
                let a = nets.qnet.forward(&next_obs)?.argmax_keepdim(D::Minus1)?;
                nets.qnet_tgt
                    .forward(&next_obs)?
                    .gather(&a, D::Minus1)?
                    .squeeze(D::Minus1)?
            } else {
                nets.qnet_tgt.forward(&next_obs)?.max(D::Minus1)?
            };
            crate::util::bootstrapped_target(
                &reward,
                &terminal,
                &next_q.detach(),
                self.config.discount_factor,
            )?
            .detach()
        };

        let loss = self.config.critic_loss.compute(&pred, &tgt)?;
        nets.opt.backward_step(&loss)?;

        if self.synchronizer.step(&nets.qnet, &mut nets.qnet_tgt)? {
            debug!("Synchronized target network at step {}", self.state.steps());
        }

        Ok(Some(loss.to_scalar::<f32>()?))
    }
}

fn check_obs_dim(obs: &FeatureObs, dim: usize) -> Result<(), KestrelError> {
    if obs.0.ncols() != dim {
        return Err(KestrelError::ShapeMismatch {
            expected: format!("observations of width {}", dim),
            found: format!("observations of width {}", obs.0.ncols()),
        });
    }
    Ok(())
}

impl<E> Policy<E> for ValueAgent<E>
where
    E: Env<Obs = FeatureObs, Act = DiscreteAct>,
{
    /// Epsilon-greedy in training mode, greedy in evaluation mode.
    ///
    /// During the initial observation period actions are uniformly random.
    fn sample(&mut self, obs: &FeatureObs) -> Result<DiscreteAct> {
        let nets = self.nets.as_ref().ok_or(KestrelError::MissingEnvironment)?;
        check_obs_dim(obs, nets.obs_dim)?;

        // The counter is advanced first, so it is 1 at the first training step.
        let train = self.state.is_train();
        if train {
            self.state.tick_step();
        }
        let step = self.state.steps();
        let greedy = !train
            || (self.explorer.sample(step) && step > self.config.initial_observation_period);

        let act = if greedy {
            let q = nets.qnet.forward(&obs.to_tensor(&self.device)?)?;
            let spec = self.state.spec()?;
            DiscreteAct::from_output(&q.detach(), &spec.action_space)?
        } else {
            let mut act = Vec::with_capacity(obs.0.nrows());
            for _ in 0..obs.0.nrows() {
                act.push(self.rng.gen_range(0..nets.n_actions) as i64);
            }
            DiscreteAct(act)
        };
        Ok(act)
    }
}

impl<E> Agent<E> for ValueAgent<E>
where
    E: Env<Obs = FeatureObs, Act = DiscreteAct>,
{
    fn kind(&self) -> AgentKind {
        AgentKind::Value
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    /// Creates the online and target Q-networks and the optimizer.
    ///
    /// Fails with [`KestrelError::Configuration`] unless the action space is discrete.
    fn build(&mut self, spec: &EnvSpec) -> Result<()> {
        if self.state.is_built() {
            self.state.build(spec)?;
            return Ok(());
        }

        let n_actions = DiscreteAct::output_dim(&spec.action_space)?;
        if n_actions == 0 {
            return Err(KestrelError::Configuration("action space is empty".to_string()).into());
        }
        let obs_dim = spec.observation_space.flat_dim();
        let mlp_config = MlpConfig::new(
            obs_dim,
            self.config.hidden_units.clone(),
            n_actions,
            Activation::None,
        );
        let qnet = Model::<Mlp>::build(&mlp_config, &self.device)?;
        let mut qnet_tgt = Model::<Mlp>::build(&mlp_config, &self.device)?;
        sync(&qnet, &mut qnet_tgt, 1.0)?;
        let opt = self.config.opt_config.build(qnet.all_vars())?;
        info!(
            "Q-network: {} -> {:?} -> {}",
            obs_dim, self.config.hidden_units, n_actions
        );

        self.nets = Some(QNets {
            qnet,
            qnet_tgt,
            opt,
            obs_dim,
            n_actions,
        });
        self.state.build(spec)?;
        Ok(())
    }

    fn observe(&mut self, transition: Transition<Vec<f32>, i64>) -> Result<()> {
        let nets = self.nets()?;
        let a = *transition.action();
        if a < 0 || a as usize >= nets.n_actions {
            return Err(KestrelError::ShapeMismatch {
                expected: format!("action in [0, {})", nets.n_actions),
                found: a.to_string(),
            }
            .into());
        }
        if transition.state().len() != nets.obs_dim
            || transition.next_state().len() != nets.obs_dim
        {
            return Err(KestrelError::ShapeMismatch {
                expected: format!("observations of width {}", nets.obs_dim),
                found: format!(
                    "widths {} and {}",
                    transition.state().len(),
                    transition.next_state().len()
                ),
            }
            .into());
        }
        self.memory.add(transition);
        Ok(())
    }

    /// Skipped during the initial observation period, between learning
    /// steps, and while the replay memory holds fewer than `batch_size`
    /// transitions.
    fn update(&mut self) -> Result<Option<Record>> {
        self.nets()?;
        let step = self.state.steps();
        if step < self.config.initial_observation_period
            || step % self.config.learning_frequency != 0
        {
            return Ok(None);
        }

        match self.update_critic()? {
            None => Ok(None),
            Some(loss) => {
                self.state.tick_update();
                Ok(Some(Record::from_slice(&[
                    ("loss_critic", RecordValue::Scalar(loss)),
                    ("epsilon", RecordValue::Scalar(self.explorer.next(step) as f32)),
                ])))
            }
        }
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        let nets = self.nets()?;
        fs::create_dir_all(path)?;
        nets.qnet.save(path.join("qnet.safetensors"))?;
        nets.qnet_tgt.save(path.join("qnet_tgt.safetensors"))?;
        self.state.save_spec(path)?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.state.check_saved_spec(path)?;
        let nets = self.nets.as_mut().ok_or(KestrelError::MissingEnvironment)?;
        nets.qnet.load(path.join("qnet.safetensors"))?;
        nets.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{exploration::EpsilonGreedyConfig, ReplayMemoryConfig, Space, Step};
    use ndarray::Array2;

    #[derive(Clone)]
    struct Dummy;

    impl Env for Dummy {
        type Obs = FeatureObs;
        type Act = DiscreteAct;

        fn spec(&self) -> EnvSpec {
            EnvSpec::new(Space::discrete(3), Space::discrete(2))
        }

        fn reset(&mut self) -> Result<FeatureObs> {
            Ok(FeatureObs(Array2::zeros((1, 3))))
        }

        fn step(&mut self, _act: &DiscreteAct) -> Result<Step<Self>> {
            Ok(Step::new(FeatureObs(Array2::zeros((1, 3))), vec![0.0], vec![true]))
        }
    }

    fn agent(config: ValueAgentConfig) -> Result<ValueAgent<Dummy>> {
        let mut agent = ValueAgent::<Dummy>::new(config)?;
        Agent::<Dummy>::build(&mut agent, &Dummy.spec())?;
        Agent::<Dummy>::train(&mut agent);
        Ok(agent)
    }

    fn transition(a: i64) -> Transition<Vec<f32>, i64> {
        Transition::new(vec![1.0, 0.0, 0.0], a, 1.0, vec![0.0, 1.0, 0.0], false)
    }

    #[test]
    fn test_update_waits_for_batch() -> Result<()> {
        let config = ValueAgentConfig::default()
            .hidden_units(vec![8])
            .batch_size(4)
            .memory(ReplayMemoryConfig::default().capacity(10));
        let mut agent = agent(config)?;

        for _ in 0..3 {
            agent.observe(transition(0))?;
            assert!(Agent::<Dummy>::update(&mut agent)?.is_none());
        }
        agent.observe(transition(1))?;
        let record = Agent::<Dummy>::update(&mut agent)?.expect("an update");
        assert!(record.get_scalar("loss_critic")?.is_finite());
        assert_eq!(agent.state.updates(), 1);
        Ok(())
    }

    #[test]
    fn test_initial_observation_period() -> Result<()> {
        let config = ValueAgentConfig::default()
            .hidden_units(vec![])
            .batch_size(1)
            .initial_observation_period(5);
        let mut agent = agent(config)?;
        let obs = FeatureObs(Array2::zeros((1, 3)));

        for _ in 0..4 {
            agent.sample(&obs)?;
            agent.observe(transition(1))?;
            assert!(Agent::<Dummy>::update(&mut agent)?.is_none());
        }
        agent.sample(&obs)?;
        assert_eq!(agent.state.steps(), 5);
        assert!(Agent::<Dummy>::update(&mut agent)?.is_some());
        Ok(())
    }

    #[test]
    fn test_first_training_step_can_be_greedy() -> Result<()> {
        let config = ValueAgentConfig::default()
            .hidden_units(vec![])
            .initial_observation_period(0)
            .exploration(EpsilonGreedyConfig::default().start(0.0).end(0.0));
        let mut agent = agent(config)?;
        let obs = FeatureObs(Array2::zeros((64, 3)));

        let act = agent.sample(&obs)?;
        assert_eq!(agent.state.steps(), 1);
        let q = agent.q_values(&FeatureObs(Array2::zeros((1, 3))))?.remove(0);
        let best = if q[1] > q[0] { 1 } else { 0 };
        assert!(act.0.iter().all(|&a| a == best));
        Ok(())
    }

    #[test]
    fn test_observe_rejects_bad_transitions() -> Result<()> {
        let mut agent = agent(ValueAgentConfig::default())?;
        assert!(agent.observe(transition(2)).is_err());
        let bad = Transition::new(vec![1.0], 0, 0.0, vec![1.0], true);
        assert!(agent.observe(bad).is_err());
        assert!(agent.memory().is_empty());
        Ok(())
    }

    #[test]
    fn test_continuous_action_space_is_rejected() -> Result<()> {
        let mut agent = ValueAgent::<Dummy>::new(ValueAgentConfig::default())?;
        let spec = EnvSpec::new(Space::discrete(3), Space::bounded(vec![-1.0], vec![1.0])?);
        let err = Agent::<Dummy>::build(&mut agent, &spec).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KestrelError>(),
            Some(KestrelError::Configuration(_))
        ));
        assert!(!agent.state.is_built());
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let config = ValueAgentConfig::default().discount_factor(1.0);
        assert!(ValueAgent::<Dummy>::new(config).is_err());
    }
}
