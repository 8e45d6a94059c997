use super::ActorCriticConfig;
use crate::{
    mlp::{Mlp, MlpConfig},
    model::{Model, SubModel2},
    obs_act::{clamp_to_bounds, scale_to_bounds},
    opt::Optimizer,
    util::{bootstrapped_target, rows_to_tensor},
    Activation, ContinuousAct, FeatureObs, PolicyAct,
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use kestrel_core::{
    exploration::{ExplorationSchedule, OrnsteinUhlenbeck},
    record::{Record, RecordValue},
    target_sync::{sync, TargetSynchronizer, Trackable},
    Agent, AgentKind, AgentState, Env, EnvSpec, EpisodeStats, KestrelError, Policy, ReplayMemory,
    Space, Transition,
};
use log::{info, trace};
use std::{fs, marker::PhantomData, path::Path};

/// Actor and critic, updated or synchronized together.
struct ActorCriticPair {
    actor: Model<Mlp>,
    critic: Model<Mlp>,
}

impl ActorCriticPair {
    fn build(actor: &MlpConfig, critic: &MlpConfig, device: &Device) -> Result<Self> {
        Ok(Self {
            actor: Model::<Mlp>::build(actor, device)?,
            critic: Model::build_with(device, |vb| <Mlp as SubModel2>::build(vb, critic))?,
        })
    }

    /// Actions in the bounds of `space`.
    fn act(&self, obs: &Tensor, space: &Space) -> Result<Tensor> {
        scale_to_bounds(&self.actor.forward(obs)?, space)
    }

    /// Action values of shape `(batch_size,)`.
    fn value(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let q = SubModel2::forward(self.critic.inner(), obs, act)?;
        Ok(q.squeeze(D::Minus1)?)
    }
}

impl Trackable for ActorCriticPair {
    fn hard_copy_from(&mut self, online: &Self) -> Result<()> {
        self.actor.hard_copy_from(&online.actor)?;
        self.critic.hard_copy_from(&online.critic)
    }

    fn soft_update_from(&mut self, online: &Self, tau: f64) -> Result<()> {
        self.actor.soft_update_from(&online.actor, tau)?;
        self.critic.soft_update_from(&online.critic, tau)
    }
}

struct Networks {
    online: ActorCriticPair,
    target: ActorCriticPair,
    actor_opt: Optimizer,
    critic_opt: Optimizer,
    noise: OrnsteinUhlenbeck,
    action_space: Space,
    obs_dim: usize,
    act_dim: usize,
}

/// Deterministic actor-critic agent for box action spaces.
pub struct ActorCriticAgent<E> {
    config: ActorCriticConfig,
    state: AgentState,
    memory: ReplayMemory<Vec<f32>, Vec<f32>>,
    synchronizer: TargetSynchronizer,
    nets: Option<Networks>,
    device: Device,
    phantom: PhantomData<E>,
}

impl<E> ActorCriticAgent<E>
where
    E: Env<Obs = FeatureObs, Act = ContinuousAct>,
{
    /// Constructs an unbuilt agent.
    ///
    /// Fails with [`KestrelError::Configuration`] on an invalid configuration.
    pub fn new(config: ActorCriticConfig) -> Result<Self> {
        config.validate()?;
        let memory = ReplayMemory::build(&config.memory)?;
        let synchronizer = TargetSynchronizer::new(&config.target_sync)?;
        let device = config.device.build()?;

        Ok(Self {
            config,
            state: AgentState::new(),
            memory,
            synchronizer,
            nets: None,
            device,
            phantom: PhantomData,
        })
    }

    /// The replay memory.
    pub fn memory(&self) -> &ReplayMemory<Vec<f32>, Vec<f32>> {
        &self.memory
    }

    /// Actions of the online actor without exploration noise.
    pub fn greedy_action(&self, obs: &FeatureObs) -> Result<ContinuousAct> {
        let nets = self.nets()?;
        check_obs_dim(obs, nets.obs_dim)?;
        let act = nets
            .online
            .act(&obs.to_tensor(&self.device)?, &nets.action_space)?;
        ContinuousAct::from_tensor(&act.detach())
    }

    fn nets(&self) -> Result<&Networks, KestrelError> {
        self.nets.as_ref().ok_or(KestrelError::MissingEnvironment)
    }

    fn update_networks(&mut self) -> Result<Option<(f32, f32)>> {
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
            let act = rows_to_tensor(
                batch.iter().map(|t| t.action().as_slice()),
                nets.act_dim,
                &self.device,
            )?;
            let reward = batch.iter().map(|t| t.reward()).collect::<Vec<_>>();
            let reward = Tensor::from_vec(reward, n, &self.device)?;
            let terminal = batch.iter().map(|t| t.terminal() as u8).collect::<Vec<_>>();
            let terminal = Tensor::from_vec(terminal, n, &self.device)?;
            (obs, act, reward, next_obs, terminal)
        };

        trace!("Update critic");
        let loss_critic = {
            let pred = nets.online.value(&obs, &act)?;
            let tgt = {
                let next_act = nets.target.act(&next_obs, &nets.action_space)?;
                let next_q = nets.target.value(&next_obs, &next_act)?;
                bootstrapped_target(
                    &reward,
                    &terminal,
                    &next_q.detach(),
                    self.config.discount_factor,
                )?
                .detach()
            };
            self.config.critic_loss.compute(&pred, &tgt)?
        };
        nets.critic_opt.backward_step(&loss_critic)?;

        trace!("Update actor");
        let loss_actor = {
            let act = nets.online.act(&obs, &nets.action_space)?;
            nets.online.value(&obs, &act)?.mean_all()?.neg()?
        };
        nets.actor_opt.backward_step(&loss_actor)?;

        self.synchronizer.step(&nets.online, &mut nets.target)?;

        Ok(Some((
            loss_critic.to_scalar::<f32>()?,
            loss_actor.to_scalar::<f32>()?,
        )))
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

impl<E> Policy<E> for ActorCriticAgent<E>
where
    E: Env<Obs = FeatureObs, Act = ContinuousAct>,
{
    /// In training mode, one noise sample is added to the actions of all
    /// sub-environments and the result is clamped to the bounds.
    fn sample(&mut self, obs: &FeatureObs) -> Result<ContinuousAct> {
        let nets = self.nets.as_mut().ok_or(KestrelError::MissingEnvironment)?;
        check_obs_dim(obs, nets.obs_dim)?;
        let act = nets
            .online
            .act(&obs.to_tensor(&self.device)?, &nets.action_space)?
            .detach();

        let act = if self.state.is_train() {
            let noise = nets.noise.next(self.state.steps());
            let noise = Tensor::from_vec(noise, (1, nets.act_dim), &self.device)?;
            let act = act.broadcast_add(&noise)?;
            self.state.tick_step();
            clamp_to_bounds(&act, &nets.action_space)?
        } else {
            act
        };

        ContinuousAct::from_tensor(&act)
    }
}

impl<E> Agent<E> for ActorCriticAgent<E>
where
    E: Env<Obs = FeatureObs, Act = ContinuousAct>,
{
    fn kind(&self) -> AgentKind {
        AgentKind::ActorCritic
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    /// Creates actor, critic, their targets and the exploration noise.
    ///
    /// Fails with [`KestrelError::Configuration`] unless the action space is a box.
    fn build(&mut self, spec: &EnvSpec) -> Result<()> {
        if self.state.is_built() {
            self.state.build(spec)?;
            return Ok(());
        }

        let act_dim = ContinuousAct::output_dim(&spec.action_space)?;
        let obs_dim = spec.observation_space.flat_dim();
        let actor_config = MlpConfig::new(
            obs_dim,
            self.config.actor_hidden_units.clone(),
            act_dim,
            Activation::Tanh,
        );
        let critic_config = MlpConfig::new(
            obs_dim + act_dim,
            self.config.critic_hidden_units.clone(),
            1,
            Activation::None,
        );

        let online = ActorCriticPair::build(&actor_config, &critic_config, &self.device)?;
        let mut target = ActorCriticPair::build(&actor_config, &critic_config, &self.device)?;
        sync(&online, &mut target, 1.0)?;
        let actor_opt = self.config.actor_opt_config.build(online.actor.all_vars())?;
        let critic_opt = self
            .config
            .critic_opt_config
            .build(online.critic.all_vars())?;
        let noise = OrnsteinUhlenbeck::build(&self.config.exploration, &spec.action_space.span())?;
        info!(
            "Actor: {} -> {:?} -> {}, critic: {} -> {:?} -> 1, noise sigma {}",
            obs_dim,
            self.config.actor_hidden_units,
            act_dim,
            obs_dim + act_dim,
            self.config.critic_hidden_units,
            noise.sigma()
        );

        self.nets = Some(Networks {
            online,
            target,
            actor_opt,
            critic_opt,
            noise,
            action_space: spec.action_space.clone(),
            obs_dim,
            act_dim,
        });
        self.state.build(spec)?;
        Ok(())
    }

    fn observe(&mut self, transition: Transition<Vec<f32>, Vec<f32>>) -> Result<()> {
        let nets = self.nets()?;
        if transition.action().len() != nets.act_dim
            || transition.state().len() != nets.obs_dim
            || transition.next_state().len() != nets.obs_dim
        {
            return Err(KestrelError::ShapeMismatch {
                expected: format!(
                    "observations of width {} and actions of width {}",
                    nets.obs_dim, nets.act_dim
                ),
                found: format!(
                    "observations of width {} and actions of width {}",
                    transition.state().len(),
                    transition.action().len()
                ),
            }
            .into());
        }
        self.memory.add(transition);
        Ok(())
    }

    /// Updates the critic, then the actor, then lets the targets track.
    fn update(&mut self) -> Result<Option<Record>> {
        self.nets()?;
        if self.state.steps() < self.config.initial_observation_period {
            return Ok(None);
        }

        match self.update_networks()? {
            None => Ok(None),
            Some((loss_critic, loss_actor)) => {
                self.state.tick_update();
                Ok(Some(Record::from_slice(&[
                    ("loss_critic", RecordValue::Scalar(loss_critic)),
                    ("loss_actor", RecordValue::Scalar(loss_actor)),
                ])))
            }
        }
    }

    /// Resets the exploration noise.
    fn end_episode(&mut self, _stats: &EpisodeStats) -> Result<()> {
        if let Some(nets) = self.nets.as_mut() {
            nets.noise.reset();
        }
        self.state.tick_episode();
        Ok(())
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        let nets = self.nets()?;
        fs::create_dir_all(path)?;
        nets.online.actor.save(path.join("actor.safetensors"))?;
        nets.target.actor.save(path.join("actor_tgt.safetensors"))?;
        nets.online.critic.save(path.join("critic.safetensors"))?;
        nets.target.critic.save(path.join("critic_tgt.safetensors"))?;
        self.state.save_spec(path)?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.state.check_saved_spec(path)?;
        let nets = self.nets.as_mut().ok_or(KestrelError::MissingEnvironment)?;
        nets.online.actor.load(path.join("actor.safetensors"))?;
        nets.target.actor.load(path.join("actor_tgt.safetensors"))?;
        nets.online.critic.load(path.join("critic.safetensors"))?;
        nets.target.critic.load(path.join("critic_tgt.safetensors"))?;
        Ok(())
    }
}
