//! Configuration of [`ActorCriticAgent`](super::ActorCriticAgent).
use crate::{opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use kestrel_core::{
    exploration::{OrnsteinUhlenbeck, OrnsteinUhlenbeckConfig},
    target_sync::TargetSyncConfig,
    KestrelError, ReplayMemoryConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ActorCriticAgent`](super::ActorCriticAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ActorCriticConfig {
    pub actor_hidden_units: Vec<usize>,
    pub critic_hidden_units: Vec<usize>,
    pub actor_opt_config: OptimizerConfig,
    pub critic_opt_config: OptimizerConfig,
    pub memory: ReplayMemoryConfig,
    pub exploration: OrnsteinUhlenbeckConfig,
    pub target_sync: TargetSyncConfig,
    pub batch_size: usize,
    pub discount_factor: f64,

    /// Steps before the first update.
    pub initial_observation_period: usize,
    pub critic_loss: CriticLoss,
    pub device: Device,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            actor_hidden_units: vec![64, 64],
            critic_hidden_units: vec![64, 64],
            actor_opt_config: OptimizerConfig::Adam {
                lr: 3e-4,
                weight_decay: None,
            },
            critic_opt_config: OptimizerConfig::Adam {
                lr: 3e-3,
                weight_decay: Some(3e-2),
            },
            memory: ReplayMemoryConfig::default(),
            exploration: OrnsteinUhlenbeckConfig::default(),
            target_sync: TargetSyncConfig::default().tau(3e-3).interval(1),
            batch_size: 64,
            discount_factor: 0.99,
            initial_observation_period: 0,
            critic_loss: CriticLoss::Mse,
            device: Device::Cpu,
        }
    }
}

impl ActorCriticConfig {
    /// Sets the hidden layers of the actor.
    pub fn actor_hidden_units(mut self, v: Vec<usize>) -> Self {
        self.actor_hidden_units = v;
        self
    }

    /// Sets the hidden layers of the critic.
    pub fn critic_hidden_units(mut self, v: Vec<usize>) -> Self {
        self.critic_hidden_units = v;
        self
    }

    /// Sets the optimizer of the actor.
    pub fn actor_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.actor_opt_config = v;
        self
    }

    /// Sets the optimizer of the critic.
    pub fn critic_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.critic_opt_config = v;
        self
    }

    /// Sets the configuration of the replay memory.
    pub fn memory(mut self, v: ReplayMemoryConfig) -> Self {
        self.memory = v;
        self
    }

    /// Sets the exploration noise.
    pub fn exploration(mut self, v: OrnsteinUhlenbeckConfig) -> Self {
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

    /// Sets the number of steps before the first update.
    pub fn initial_observation_period(mut self, v: usize) -> Self {
        self.initial_observation_period = v;
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
        // The span is not known before build; this checks theta and an explicit sigma.
        OrnsteinUhlenbeck::build(&self.exploration, &[])?;
        Ok(())
    }

    /// Constructs [`ActorCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorCriticConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_actor_critic_config() -> Result<()> {
        let config = ActorCriticConfig::default()
            .actor_hidden_units(vec![16])
            .exploration(OrnsteinUhlenbeckConfig::default().sigma(0.2));

        let dir = TempDir::new("actor_critic_config")?;
        let path = dir.path().join("actor_critic_config.yaml");
        config.save(&path)?;
        let config_ = ActorCriticConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(ActorCriticConfig::default().validate().is_ok());
        let config = ActorCriticConfig::default()
            .exploration(OrnsteinUhlenbeckConfig::default().theta(0.0));
        assert!(config.validate().is_err());
        let config = ActorCriticConfig::default().discount_factor(0.0);
        assert!(config.validate().is_err());
    }
}
