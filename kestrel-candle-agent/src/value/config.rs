//! Configuration of [`ValueAgent`](super::ValueAgent).
use crate::{opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use kestrel_core::{
    exploration::EpsilonGreedyConfig, target_sync::TargetSyncConfig, KestrelError,
    ReplayMemoryConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ValueAgent`](super::ValueAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ValueAgentConfig {
    /// Widths of the hidden layers of the Q-network.
    pub hidden_units: Vec<usize>,
    pub opt_config: OptimizerConfig,
    pub memory: ReplayMemoryConfig,
    pub exploration: EpsilonGreedyConfig,
    pub target_sync: TargetSyncConfig,
    pub batch_size: usize,
    pub discount_factor: f64,

    /// Select the next action with the online network and evaluate it with the target.
    pub double_dqn: bool,

    /// Steps during which actions are random and no update is performed.
    pub initial_observation_period: usize,

    /// An update is performed every `learning_frequency` steps.
    pub learning_frequency: usize,
    pub critic_loss: CriticLoss,
    pub device: Device,

    /// Seed of the RNG drawing random actions.
    pub seed: u64,
}

impl Default for ValueAgentConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![64, 64],
            opt_config: OptimizerConfig::Adam {
                lr: 1e-3,
                weight_decay: None,
            },
            memory: ReplayMemoryConfig::default(),
            exploration: EpsilonGreedyConfig::default(),
            target_sync: TargetSyncConfig::default(),
            batch_size: 128,
            discount_factor: 0.99,
            double_dqn: true,
            initial_observation_period: 0,
            learning_frequency: 1,
            critic_loss: CriticLoss::Mse,
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl ValueAgentConfig {
    /// Sets the hidden layers of the Q-network.
    pub fn hidden_units(mut self, v: Vec<usize>) -> Self {
        self.hidden_units = v;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the configuration of the replay memory.
    pub fn memory(mut self, v: ReplayMemoryConfig) -> Self {
        self.memory = v;
        self
    }

    /// Sets the epsilon schedule.
    pub fn exploration(mut self, v: EpsilonGreedyConfig) -> Self {
        self.exploration = v;
        self
    }

    /// Sets the target synchronization.
    pub fn target_sync(mut self, v: TargetSyncConfig) -> Self {
        self.target_sync = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Enables or disables double DQN targets.
    pub fn double_dqn(mut self, v: bool) -> Self {
        self.double_dqn = v;
        self
    }

    /// Sets the number of warmup steps.
    pub fn initial_observation_period(mut self, v: usize) -> Self {
        self.initial_observation_period = v;
        self
    }

    /// Sets the number of steps between updates.
    pub fn learning_frequency(mut self, v: usize) -> Self {
        self.learning_frequency = v;
        self
    }

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the seed of the action RNG.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub(super) fn validate(&self) -> Result<(), KestrelError> {
        if !(self.discount_factor > 0.0 && self.discount_factor < 1.0) {
            return Err(KestrelError::Configuration(format!(
                "discount factor must be in (0, 1), got {}",
                self.discount_factor
            )));
        }
        if self.batch_size == 0 {
            return Err(KestrelError::Configuration(
                "batch size must be positive".to_string(),
            ));
        }
        if self.learning_frequency == 0 {
            return Err(KestrelError::Configuration(
                "learning frequency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Constructs [`ValueAgentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ValueAgentConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
