use super::EvolutionConfig;
use crate::{
    mlp::{Mlp, MlpConfig},
    model::Model,
    util::{named_tensors, set_named_tensors},
    Activation, FeatureObs, PolicyAct,
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use itertools::Itertools;
use kestrel_core::{
    record::{Record, RecordValue},
    ActItem, Agent, AgentKind, AgentState, Env, EnvSpec, EpisodeStats, KestrelError, ObsItem, Policy,
    Space, Transition,
};
use log::{debug, info};
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::{collections::BTreeMap, fs, marker::PhantomData, path::Path};

type Params = BTreeMap<String, Tensor>;

struct Population {
    center: Model<Mlp>,
    member: Model<Mlp>,
    noises: Vec<Params>,
    fitness: Vec<f32>,
    action_space: Space,
    obs_dim: usize,
}

/// Evolution strategies agent.
///
/// In training mode each episode is played by the current member of the
/// population. In evaluation mode the center policy acts.
pub struct EvolutionAgent<E> {
    config: EvolutionConfig,
    state: AgentState,
    population: Option<Population>,
    device: Device,
    rng: StdRng,
    phantom: PhantomData<E>,
}

/// Computes centered rank utilities in `[-0.5, 0.5]`.
///
/// The lowest fitness gets `-0.5` and the highest `0.5`.
fn centered_ranks(fitness: &[f32]) -> Vec<f64> {
    let n = fitness.len();
    let mut utility = vec![0f64; n];
    if n < 2 {
        return utility;
    }
    let order = fitness
        .iter()
        .enumerate()
        .sorted_by_key(|(_, f)| OrderedFloat(**f))
        .map(|(i, _)| i);
    for (rank, i) in order.enumerate() {
        utility[i] = rank as f64 / (n - 1) as f64 - 0.5;
    }
    utility
}

impl<E> EvolutionAgent<E>
where
    E: Env<Obs = FeatureObs>,
    E::Act: PolicyAct,
{
    /// Constructs an unbuilt agent.
    pub fn new(config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let device = config.device.build()?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            state: AgentState::new(),
            population: None,
            device,
            rng,
            phantom: PhantomData,
        })
    }

    /// Parameters of the center policy.
    pub fn center_params(&self) -> Result<BTreeMap<String, Tensor>> {
        named_tensors(self.population()?.center.varmap())
    }

    /// Number of members evaluated in the current generation.
    pub fn evaluated(&self) -> usize {
        self.population.as_ref().map_or(0, |p| p.fitness.len())
    }

    fn population(&self) -> Result<&Population, KestrelError> {
        self.population
            .as_ref()
            .ok_or(KestrelError::MissingEnvironment)
    }

    fn perturbation(rng: &mut StdRng, center: &Params, device: &Device) -> Result<Params> {
        center
            .iter()
            .map(|(k, t)| {
                let data = (0..t.elem_count())
                    .map(|_| StandardNormal.sample(rng))
                    .collect::<Vec<f32>>();
                Ok((k.clone(), Tensor::from_vec(data, t.shape(), device)?))
            })
            .collect()
    }

    /// Draws the perturbation of the next member and loads `center + sigma * noise` into it.
    fn next_member(&mut self) -> Result<()> {
        let population = self
            .population
            .as_mut()
            .ok_or(KestrelError::MissingEnvironment)?;
        let center = named_tensors(population.center.varmap())?;
        let noise = Self::perturbation(&mut self.rng, &center, &self.device)?;
        let member = perturb(&center, &noise, self.config.sigma)?;
        set_named_tensors(population.member.varmap(), &member)?;
        population.noises.push(noise);
        Ok(())
    }

    /// Moves the center along the rank-weighted perturbations.
    fn step_center(&mut self) -> Result<()> {
        let population = self
            .population
            .as_mut()
            .ok_or(KestrelError::MissingEnvironment)?;
        let n = population.fitness.len();
        let utility = centered_ranks(&population.fitness);
        let scale = self.config.learning_rate / (n as f64 * self.config.sigma);

        let mut center = named_tensors(population.center.varmap())?;
        for (u, noise) in utility.iter().zip(population.noises.iter()) {
            for (k, t) in center.iter_mut() {
                if let Some(eps) = noise.get(k) {
                    *t = (&*t + eps.affine(scale * u, 0.0)?)?;
                }
            }
        }
        set_named_tensors(population.center.varmap(), &center)?;

        population.fitness.clear();
        population.noises.clear();
        Ok(())
    }
}

/// `center + sigma * noise`, per parameter.
fn perturb(center: &Params, noise: &Params, sigma: f64) -> Result<Params> {
    center
        .iter()
        .map(|(k, t)| {
            let eps = noise.get(k).ok_or_else(|| KestrelError::ShapeMismatch {
                expected: k.clone(),
                found: "no perturbation".to_string(),
            })?;
            Ok((k.clone(), (t + eps.affine(sigma, 0.0)?)?))
        })
        .collect()
}

impl<E> Policy<E> for EvolutionAgent<E>
where
    E: Env<Obs = FeatureObs>,
    E::Act: PolicyAct,
{
    fn sample(&mut self, obs: &FeatureObs) -> Result<E::Act> {
        let population = self
            .population
            .as_ref()
            .ok_or(KestrelError::MissingEnvironment)?;
        if obs.0.ncols() != population.obs_dim {
            return Err(KestrelError::ShapeMismatch {
                expected: format!("observations of width {}", population.obs_dim),
                found: format!("observations of width {}", obs.0.ncols()),
            }
            .into());
        }

        let train = self.state.is_train();
        let model = if train {
            &population.member
        } else {
            &population.center
        };
        let out = model.forward(&obs.to_tensor(&self.device)?)?;
        let act = <E::Act as PolicyAct>::from_output(&out.detach(), &population.action_space)?;

        if train {
            self.state.tick_step();
        }
        Ok(act)
    }
}

impl<E> Agent<E> for EvolutionAgent<E>
where
    E: Env<Obs = FeatureObs>,
    E::Act: PolicyAct,
{
    fn kind(&self) -> AgentKind {
        AgentKind::Evolution
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    fn build(&mut self, spec: &EnvSpec) -> Result<()> {
        if self.state.is_built() {
            self.state.build(spec)?;
            return Ok(());
        }

        let out_dim = <E::Act as PolicyAct>::output_dim(&spec.action_space)?;
        let obs_dim = spec.observation_space.flat_dim();
        let activation_out = if <E::Act as PolicyAct>::squashed() {
            Activation::Tanh
        } else {
            Activation::None
        };
        let mlp_config = MlpConfig::new(
            obs_dim,
            self.config.hidden_units.clone(),
            out_dim,
            activation_out,
        );
        let center = Model::<Mlp>::build(&mlp_config, &self.device)?;
        let member = Model::<Mlp>::build(&mlp_config, &self.device)?;
        info!(
            "Policy: {} -> {:?} -> {}, population {}",
            obs_dim, self.config.hidden_units, out_dim, self.config.population_size
        );

        self.population = Some(Population {
            center,
            member,
            noises: vec![],
            fitness: vec![],
            action_space: spec.action_space.clone(),
            obs_dim,
        });
        self.next_member()?;
        self.state.build(spec)?;
        Ok(())
    }

    /// Transitions are not used.
    fn observe(&mut self, _transition: Transition<ObsItem<E>, ActItem<E>>) -> Result<()> {
        Ok(())
    }

    /// Returns `Ok(None)` until every member of the population has a fitness.
    fn update(&mut self) -> Result<Option<Record>> {
        let population = self.population()?;
        if population.fitness.len() < self.config.population_size {
            return Ok(None);
        }

        let fitness = population.fitness.clone();
        self.step_center()?;
        self.next_member()?;
        self.state.tick_update();

        let n = fitness.len() as f32;
        let mean = fitness.iter().sum::<f32>() / n;
        let (min, max) = fitness
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &f| {
                (lo.min(f), hi.max(f))
            });
        debug!(
            "Generation {}: fitness mean {}, max {}",
            self.state.updates(),
            mean,
            max
        );

        Ok(Some(Record::from_slice(&[
            ("fitness_mean", RecordValue::Scalar(mean)),
            ("fitness_min", RecordValue::Scalar(min)),
            ("fitness_max", RecordValue::Scalar(max)),
        ])))
    }

    /// In training mode, records the return as the fitness of the current
    /// member and moves on to the next one.
    fn end_episode(&mut self, stats: &EpisodeStats) -> Result<()> {
        self.state.tick_episode();
        if !self.state.is_train() {
            return Ok(());
        }
        let population = self
            .population
            .as_mut()
            .ok_or(KestrelError::MissingEnvironment)?;
        population.fitness.push(stats.total_return);
        if population.fitness.len() < self.config.population_size {
            self.next_member()?;
        }
        Ok(())
    }

    /// Saves the center policy.
    fn save_params(&self, path: &Path) -> Result<()> {
        let population = self.population()?;
        fs::create_dir_all(path)?;
        population.center.save(path.join("center.safetensors"))?;
        self.state.save_spec(path)?;
        Ok(())
    }

    /// Loads the center policy and restarts the current generation from it.
    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.state.check_saved_spec(path)?;
        let population = self
            .population
            .as_mut()
            .ok_or(KestrelError::MissingEnvironment)?;
        population.center.load(path.join("center.safetensors"))?;
        population.fitness.clear();
        population.noises.clear();
        self.next_member()
    }
}
