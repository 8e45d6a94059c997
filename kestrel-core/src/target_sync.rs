//! Synchronization of target models.
//!
//! A target model tracks an online model either by an exact copy
//! (`tau == 1`) or by Polyak averaging
//! `target <- tau * online + (1 - tau) * target` (`0 < tau < 1`).
//! Synchronization must run after the optimizer step of the online model
//! has completed. How often it runs is up to the caller, see
//! [`TargetSynchronizer`].
use crate::error::KestrelError;
use anyhow::Result;
use log::trace;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// A model whose parameters can track another model of the same structure.
pub trait Trackable {
    /// Overwrites every parameter with the corresponding one of `online`.
    fn hard_copy_from(&mut self, online: &Self) -> Result<()>;

    /// Sets every parameter to `tau * online + (1 - tau) * self`.
    fn soft_update_from(&mut self, online: &Self, tau: f64) -> Result<()>;
}

fn check_tau(tau: f64) -> Result<(), KestrelError> {
    if tau > 0.0 && tau <= 1.0 {
        Ok(())
    } else {
        Err(KestrelError::Configuration(format!(
            "tau must be in (0, 1], got {}",
            tau
        )))
    }
}

/// Synchronizes `target` with `online`.
///
/// `tau == 1` is a hard copy, `0 < tau < 1` a soft update. Any other value
/// is a [`KestrelError::Configuration`].
pub fn sync<T: Trackable>(online: &T, target: &mut T, tau: f64) -> Result<()> {
    check_tau(tau)?;
    if tau == 1.0 {
        target.hard_copy_from(online)
    } else {
        target.soft_update_from(online, tau)
    }
}

/// Configuration of [`TargetSynchronizer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct TargetSyncConfig {
    /// Blending factor, `1` for hard copies.
    pub tau: f64,

    /// Number of [`TargetSynchronizer::step`] calls between synchronizations.
    pub interval: usize,
}

impl Default for TargetSyncConfig {
    fn default() -> Self {
        Self {
            tau: 1.0,
            interval: 1000,
        }
    }
}

impl TargetSyncConfig {
    /// Sets the blending factor.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the interval.
    pub fn interval(mut self, v: usize) -> Self {
        self.interval = v;
        self
    }

    /// Constructs [`TargetSyncConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TargetSyncConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Counts update cycles and synchronizes a target model every `interval` of them.
#[derive(Debug, Clone)]
pub struct TargetSynchronizer {
    tau: f64,
    interval: usize,
    counter: usize,
}

impl TargetSynchronizer {
    /// Validates the configuration and constructs the synchronizer.
    pub fn new(config: &TargetSyncConfig) -> Result<Self, KestrelError> {
        check_tau(config.tau)?;
        if config.interval == 0 {
            return Err(KestrelError::Configuration(
                "interval of target synchronization must be positive".to_string(),
            ));
        }

        Ok(Self {
            tau: config.tau,
            interval: config.interval,
            counter: 0,
        })
    }

    /// Blending factor.
    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Interval between synchronizations.
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Counts one update cycle and synchronizes when the interval is reached.
    ///
    /// Call after the optimizer step of `online`. Returns `true` if the
    /// target was synchronized.
    pub fn step<T: Trackable>(&mut self, online: &T, target: &mut T) -> Result<bool> {
        self.counter += 1;
        if self.counter < self.interval {
            return Ok(false);
        }
        self.counter = 0;
        trace!("Synchronize target with tau = {}", self.tau);
        sync(online, target, self.tau)?;
        Ok(true)
    }
}

impl Trackable for Vec<f32> {
    fn hard_copy_from(&mut self, online: &Self) -> Result<()> {
        check_len(self, online)?;
        self.copy_from_slice(online);
        Ok(())
    }

    fn soft_update_from(&mut self, online: &Self, tau: f64) -> Result<()> {
        check_len(self, online)?;
        let tau = tau as f32;
        self.iter_mut()
            .zip(online.iter())
            .for_each(|(t, o)| *t = tau * o + (1.0 - tau) * *t);
        Ok(())
    }
}

fn check_len(target: &[f32], online: &[f32]) -> Result<(), KestrelError> {
    if target.len() != online.len() {
        return Err(KestrelError::ShapeMismatch {
            expected: format!("[{}]", target.len()),
            found: format!("[{}]", online.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn test_hard_sync_is_exact() -> Result<()> {
        let online = vec![0.1f32, -2.5, 3.25, 1e-7];
        let mut target = vec![0f32; 4];
        sync(&online, &mut target, 1.0)?;
        assert_eq!(target, online);
        Ok(())
    }

    #[test]
    fn test_soft_sync_half_life() -> Result<()> {
        let tau = 0.01;
        let online = vec![1f32, -1.0, 2.0];
        let mut target = vec![0f32; 3];
        let d0 = distance(&online, &target);

        let half_life = (2f64.ln() / tau).round() as usize;
        for _ in 0..half_life {
            sync(&online, &mut target, tau)?;
        }
        let r = distance(&online, &target) / d0;
        assert!((r - 0.5).abs() < 0.02, "ratio {}", r);

        for _ in 0..half_life {
            sync(&online, &mut target, tau)?;
        }
        let r = distance(&online, &target) / d0;
        assert!((r - 0.25).abs() < 0.02, "ratio {}", r);
        Ok(())
    }

    #[test]
    fn test_invalid_tau() {
        let online = vec![1f32];
        let mut target = vec![0f32];
        for tau in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(sync(&online, &mut target, tau).is_err());
        }
        assert_eq!(target, vec![0f32]);
        assert!(TargetSynchronizer::new(&TargetSyncConfig::default().tau(2.0)).is_err());
        assert!(TargetSynchronizer::new(&TargetSyncConfig::default().interval(0)).is_err());
    }

    #[test]
    fn test_interval() -> Result<()> {
        let config = TargetSyncConfig::default().tau(1.0).interval(3);
        let mut synchronizer = TargetSynchronizer::new(&config)?;
        let online = vec![5f32];
        let mut target = vec![0f32];

        assert!(!synchronizer.step(&online, &mut target)?);
        assert!(!synchronizer.step(&online, &mut target)?);
        assert_eq!(target, vec![0f32]);
        assert!(synchronizer.step(&online, &mut target)?);
        assert_eq!(target, vec![5f32]);
        assert!(!synchronizer.step(&online, &mut target)?);
        Ok(())
    }

    #[test]
    fn test_config_yaml() -> Result<()> {
        let dir = tempdir::TempDir::new("target_sync")?;
        let path = dir.path().join("target_sync.yaml");
        let config = TargetSyncConfig::default().tau(0.005).interval(1);
        config.save(&path)?;
        assert_eq!(TargetSyncConfig::load(&path)?, config);

        std::fs::write(&path, "tau: 0.5\ninterval: 2\nperiod: 3\n")?;
        assert!(TargetSyncConfig::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let online = vec![1f32, 2.0];
        let mut target = vec![0f32];
        let err = sync(&online, &mut target, 1.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KestrelError>(),
            Some(KestrelError::ShapeMismatch { .. })
        ));
    }
}
