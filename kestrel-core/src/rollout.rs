//! Drives an [`Agent`] through episodes.
mod config;
mod stats;
mod stop;
use crate::{
    record::{RecordStorage, RecordValue, Recorder},
    Act, Agent, Env, KestrelError, Obs, Transition,
};
use anyhow::Result;
use chrono::Local;
pub use config::RolloutConfig;
use log::{debug, info};
pub use stats::{EpisodeStats, StatisticCollection, TrainingSummary};
use std::path::Path;
pub use stop::StopToken;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs episodes of an [`Agent`] on an [`Env`].
///
/// # Episode state machine
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Reset
///     Reset --> Act
///     Act --> Step
///     Step --> Observe
///     Observe --> Act: some sub-environment alive and below step cap
///     Observe --> Terminated: all terminated or step cap reached
///     Terminated --> [*]
/// ```
///
/// * `Reset` obtains the initial observation with [`Env::reset`].
/// * `Act` samples an action from the agent.
/// * `Step` forwards the action to [`Env::step`].
/// * `Observe` clips rewards if configured, hands one [`Transition`] per
///   live sub-environment to [`Agent::observe`] and, in training mode,
///   calls [`Agent::update`] for agents updating every step.
///
/// Sub-environments that already terminated are ignored until the episode
/// ends. Errors of the environment are returned to the caller unchanged.
///
/// # Training loop
///
/// [`RolloutProcedure::train`] repeats episodes until the episode budget is
/// used up, the [`StopToken`] is triggered, or the agent reports
/// [`Agent::end_training`]. Both are checked between episodes only.
/// Agents of kind [`Evolution`](crate::AgentKind::Evolution) are updated
/// once after each episode.
pub struct RolloutProcedure {
    config: RolloutConfig,
    stop: StopToken,
    storage: RecordStorage,
}

impl RolloutProcedure {
    /// Constructs the procedure.
    pub fn new(config: RolloutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop: StopToken::new(),
            storage: RecordStorage::new(),
        })
    }

    /// Returns a token stopping [`RolloutProcedure::train`] at the next episode boundary.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    fn clip(&self, r: f32) -> f32 {
        if self.config.clip_reward {
            r.clamp(-1.0, 1.0)
        } else {
            r
        }
    }

    /// Runs one episode in the current mode of the agent.
    ///
    /// The agent must be built.
    pub fn run_episode<E, A>(&mut self, agent: &mut A, env: &mut E) -> Result<EpisodeStats>
    where
        E: Env,
        A: Agent<E>,
    {
        let episode = agent.state().episodes() + 1;
        self.rollout(agent, env, episode)
    }

    fn rollout<E, A>(&mut self, agent: &mut A, env: &mut E, episode: usize) -> Result<EpisodeStats>
    where
        E: Env,
        A: Agent<E>,
    {
        agent.state().spec()?;
        let train = agent.is_train();
        let kind = agent.kind();

        let mut obs = env.reset()?;
        let n = obs.len();
        let mut done = vec![false; n];
        let mut returns = vec![0f32; n];
        let mut length = 0;
        let mut truncated = false;

        loop {
            if let Some(max_steps) = self.config.max_steps_per_episode {
                if length >= max_steps {
                    truncated = true;
                    break;
                }
            }

            let act = agent.sample(&obs)?;
            let step = env.step(&act)?;
            length += 1;
            if act.len() != n
                || step.obs.len() != n
                || step.reward.len() != n
                || step.is_terminated.len() != n
            {
                return Err(KestrelError::ShapeMismatch {
                    expected: format!("{} sub-environments", n),
                    found: format!(
                        "{} actions, {} observations, {} rewards and {} termination flags",
                        act.len(),
                        step.obs.len(),
                        step.reward.len(),
                        step.is_terminated.len()
                    ),
                }
                .into());
            }

            for i in 0..n {
                if done[i] {
                    continue;
                }
                returns[i] += step.reward[i];
                if train && kind.stores_transitions() {
                    agent.observe(Transition::new(
                        obs.item(i),
                        act.item(i),
                        self.clip(step.reward[i]),
                        step.obs.item(i),
                        step.is_terminated[i],
                    ))?;
                }
                done[i] = step.is_terminated[i];
            }

            if train && kind.updates_per_step() {
                if let Some(record) = agent.update()? {
                    self.storage.store(record);
                }
            }

            obs = step.obs;
            if done.iter().all(|&d| d) {
                break;
            }
        }

        let total_return = returns.iter().sum::<f32>() / n.max(1) as f32;
        debug!(
            "Episode {}: length {}, return {}",
            episode, length, total_return
        );

        Ok(EpisodeStats {
            episode,
            length,
            total_return,
            returns,
            truncated,
        })
    }

    /// Trains the agent.
    ///
    /// The agent is built from [`Env::spec`] and switched to training mode.
    /// Every `record_interval` episodes the episode statistics, merged with
    /// the aggregated update records and stamped with `datetime`, are
    /// written to `recorder`. When
    /// `model_dir` is set, the agent is saved to `{model_dir}/best` whenever
    /// the episode return improves and to `{model_dir}/final` at the end.
    pub fn train<E, A, R>(
        &mut self,
        agent: &mut A,
        env: &mut E,
        recorder: &mut R,
    ) -> Result<TrainingSummary>
    where
        E: Env,
        A: Agent<E>,
        R: Recorder + ?Sized,
    {
        agent.build(&env.spec())?;
        agent.train();

        let mut summary = TrainingSummary {
            statistics: StatisticCollection::new(),
            ..Default::default()
        };

        for _ in 0..self.config.episodes {
            if self.stop.is_stopped() {
                agent.stop_training();
            }
            if agent.end_training() {
                summary.stopped = true;
                break;
            }

            let stats = self.run_episode(agent, env)?;
            agent.end_episode(&stats)?;
            if !agent.kind().updates_per_step() {
                if let Some(record) = agent.update()? {
                    self.storage.store(record);
                }
            }

            summary.episodes += 1;
            summary.steps += stats.length;
            summary.statistics.push_episode(&stats);

            let improved = summary
                .best_return
                .map_or(true, |best| stats.total_return > best);
            if improved {
                summary.best_return = Some(stats.total_return);
                self.save::<E, A>(agent, "best")?;
            }

            let interval = self.config.record_interval;
            if interval > 0 && summary.episodes % interval == 0 {
                let mut record = stats.to_record();
                record.insert("datetime", RecordValue::DateTime(Local::now()));
                if let Some(avg) = summary.statistics.moving_average("returns", interval) {
                    record.insert("episode_return_avg", RecordValue::Scalar(avg));
                }
                if !self.storage.is_empty() {
                    record.merge_inplace(self.storage.aggregate());
                }
                info!(
                    "Episode {}: return {:.3}, length {}",
                    stats.episode, stats.total_return, stats.length
                );
                recorder.write(stats.episode, record);
            }
        }

        self.save::<E, A>(agent, "final")?;
        info!(
            "Finished training: {} episodes, {} steps",
            summary.episodes, summary.steps
        );

        Ok(summary)
    }

    /// Runs `episodes` episodes in evaluation mode.
    ///
    /// Nothing is stored and no update is performed.
    pub fn evaluate<E, A>(
        &mut self,
        agent: &mut A,
        env: &mut E,
        episodes: usize,
    ) -> Result<Vec<EpisodeStats>>
    where
        E: Env,
        A: Agent<E>,
    {
        agent.build(&env.spec())?;
        agent.eval();
        let mut stats = Vec::with_capacity(episodes);
        for ix in 1..=episodes {
            stats.push(self.rollout(agent, env, ix)?);
        }
        Ok(stats)
    }

    fn save<E, A>(&self, agent: &A, name: &str) -> Result<()>
    where
        E: Env,
        A: Agent<E>,
    {
        if let Some(model_dir) = &self.config.model_dir {
            let path = Path::new(model_dir).join(name);
            std::fs::create_dir_all(&path)?;
            agent.save_params(&path)?;
            info!("Saved the model in {:?}", &path);
        }
        Ok(())
    }
}
