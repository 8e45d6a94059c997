//! Configuration of [`EvolutionAgent`](super::EvolutionAgent).
use crate::Device;
use anyhow::Result;
use kestrel_core::KestrelError;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`EvolutionAgent`](super::EvolutionAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Widths of the hidden layers of the policy.
    pub hidden_units: Vec<usize>,

    /// Number of perturbed members evaluated per generation.
    pub population_size: usize,

    /// Standard deviation of the parameter perturbations.
    pub sigma: f64,
    pub learning_rate: f64,
    pub device: Device,

    /// Seed of the perturbations.
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![64],
            population_size: 10,
            sigma: 0.1,
            learning_rate: 0.03,
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl EvolutionConfig {
    /// Sets the hidden layers of the policy.
    pub fn hidden_units(mut self, v: Vec<usize>) -> Self {
        self.hidden_units = v;
        self
    }

    /// Sets the population size.
    pub fn population_size(mut self, v: usize) -> Self {
        self.population_size = v;
        self
    }

    /// Sets the perturbation scale.
    pub fn sigma(mut self, v: f64) -> Self {
        self.sigma = v;
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.learning_rate = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub(super) fn validate(&self) -> Result<(), KestrelError> {
        if self.population_size < 2 {
            return Err(KestrelError::Configuration(format!(
                "population size must be at least 2, got {}",
                self.population_size
            )));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(KestrelError::Configuration(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(KestrelError::Configuration(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Constructs [`EvolutionConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EvolutionConfig`] as a YAML file.
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
    fn test_serde_evolution_config() -> Result<()> {
        let config = EvolutionConfig::default().population_size(4).sigma(0.05);

        let dir = TempDir::new("evolution_config")?;
        let path = dir.path().join("evolution_config.yaml");
        config.save(&path)?;
        let config_ = EvolutionConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(EvolutionConfig::default().validate().is_ok());
        assert!(EvolutionConfig::default().population_size(1).validate().is_err());
        assert!(EvolutionConfig::default().sigma(0.0).validate().is_err());
        assert!(EvolutionConfig::default().learning_rate(-1.0).validate().is_err());
    }
}
