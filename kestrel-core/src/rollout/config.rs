//! Configuration of [`RolloutProcedure`](super::RolloutProcedure).
use crate::error::KestrelError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutProcedure`](super::RolloutProcedure).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct RolloutConfig {
    /// Maximum number of training episodes.
    pub episodes: usize,

    /// Step cap of an episode. `None` runs until every sub-environment terminates.
    #[serde(default)]
    pub max_steps_per_episode: Option<usize>,

    /// Clip rewards to `[-1, 1]` before they are stored.
    #[serde(default)]
    pub clip_reward: bool,

    /// Interval of writing statistics in episodes. `0` disables writing.
    pub record_interval: usize,

    /// Directory where the best and the final model are saved.
    #[serde(default)]
    pub model_dir: Option<String>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            max_steps_per_episode: None,
            clip_reward: false,
            record_interval: 10,
            model_dir: None,
        }
    }
}

impl RolloutConfig {
    /// Sets the number of training episodes.
    pub fn episodes(mut self, v: usize) -> Self {
        self.episodes = v;
        self
    }

    /// Sets the step cap of an episode.
    pub fn max_steps_per_episode(mut self, v: usize) -> Self {
        self.max_steps_per_episode = Some(v);
        self
    }

    /// Enables or disables reward clipping.
    pub fn clip_reward(mut self, v: bool) -> Self {
        self.clip_reward = v;
        self
    }

    /// Sets the interval of writing statistics in episodes.
    pub fn record_interval(mut self, v: usize) -> Self {
        self.record_interval = v;
        self
    }

    /// Sets the directory where models are saved.
    pub fn model_dir(mut self, v: impl Into<String>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    pub(super) fn validate(&self) -> Result<(), KestrelError> {
        if self.max_steps_per_episode == Some(0) {
            return Err(KestrelError::Configuration(
                "max_steps_per_episode must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Constructs [`RolloutConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RolloutConfig`] as a YAML file.
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
    fn test_serde_rollout_config() -> Result<()> {
        let config = RolloutConfig::default()
            .episodes(20)
            .max_steps_per_episode(200)
            .clip_reward(true)
            .model_dir("model");

        let dir = TempDir::new("rollout_config")?;
        let path = dir.path().join("rollout_config.yaml");
        config.save(&path)?;
        assert_eq!(config, RolloutConfig::load(&path)?);
        Ok(())
    }

    #[test]
    fn test_partial_yaml() -> Result<()> {
        let config: RolloutConfig = serde_yaml::from_str("episodes: 5\nrecord_interval: 1\n")?;
        assert_eq!(config.max_steps_per_episode, None);
        assert!(!config.clip_reward);
        assert!(serde_yaml::from_str::<RolloutConfig>("episodes: 5\nrecord_interval: 1\nrender: true\n").is_err());
        Ok(())
    }
}
