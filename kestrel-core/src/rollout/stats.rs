//! Episode statistics.
use crate::record::{Record, RecordValue};
use anyhow::Result;
use log::info;
use std::{collections::BTreeMap, fs::create_dir_all, path::Path};

/// Summary of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStats {
    /// Index of the episode, starting at 1.
    pub episode: usize,

    /// Number of environment steps.
    pub length: usize,

    /// Mean over sub-environments of the summed rewards.
    pub total_return: f32,

    /// Summed rewards of each sub-environment.
    pub returns: Vec<f32>,

    /// `true` if the step cap ended the episode.
    pub truncated: bool,
}

impl EpisodeStats {
    /// Converts the statistics into a record.
    pub fn to_record(&self) -> Record {
        let mut record = Record::from_slice(&[
            ("episode", RecordValue::Scalar(self.episode as f32)),
            ("episode_length", RecordValue::Scalar(self.length as f32)),
            ("episode_return", RecordValue::Scalar(self.total_return)),
        ]);
        if self.returns.len() > 1 {
            record.insert("sub_env_returns", RecordValue::Array1(self.returns.clone()));
        }
        record
    }
}

/// Named series of values with summary measures.
///
/// The rollout keeps `returns` and `lengths` of every training episode.
#[derive(Debug, Clone, Default)]
pub struct StatisticCollection {
    series: BTreeMap<String, Vec<f32>>,
}

impl StatisticCollection {
    /// Creates a collection with the `returns` and `lengths` series.
    pub fn new() -> Self {
        let mut s = Self::default();
        s.add_statistic("returns");
        s.add_statistic("lengths");
        s
    }

    /// Adds an empty series unless it exists.
    pub fn add_statistic(&mut self, name: impl Into<String>) {
        self.series.entry(name.into()).or_default();
    }

    /// Removes a series.
    pub fn remove_statistic(&mut self, name: &str) {
        self.series.remove(name);
    }

    /// Appends a value, creating the series if needed.
    pub fn push(&mut self, name: &str, v: f32) {
        self.series.entry(name.to_string()).or_default().push(v);
    }

    /// Appends the return and length of an episode.
    pub fn push_episode(&mut self, stats: &EpisodeStats) {
        self.push("returns", stats.total_return);
        self.push("lengths", stats.length as f32);
    }

    /// Values of a series.
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if there is no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Mean of the last `window` values of a series.
    pub fn moving_average(&self, name: &str, window: usize) -> Option<f32> {
        let vs = self.get(name)?;
        if vs.is_empty() || window == 0 {
            return None;
        }
        let tail = &vs[vs.len().saturating_sub(window)..];
        Some(tail.iter().sum::<f32>() / tail.len() as f32)
    }

    /// Mean, median, min, max and standard deviation of a series as a record.
    ///
    /// Keys are `{name}_mean` and so on. Empty series give an empty record.
    pub fn measures(&self, name: &str) -> Record {
        let vs = match self.get(name) {
            Some(vs) if !vs.is_empty() => vs,
            _ => return Record::empty(),
        };
        let n = vs.len() as f32;
        let mean = vs.iter().sum::<f32>() / n;
        let var = vs.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let mut sorted = vs.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Record::from_slice(&[
            (format!("{}_mean", name), RecordValue::Scalar(mean)),
            (format!("{}_median", name), RecordValue::Scalar(sorted[sorted.len() / 2])),
            (format!("{}_min", name), RecordValue::Scalar(sorted[0])),
            (format!("{}_max", name), RecordValue::Scalar(sorted[sorted.len() - 1])),
            (format!("{}_stdev", name), RecordValue::Scalar(var.sqrt())),
        ])
    }

    /// Writes every series to `{dir}/{name}.csv`, one value per row.
    pub fn save_csv(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        for (name, vs) in self.series.iter() {
            let path = dir.join(format!("{}.csv", name));
            let mut wtr = csv::Writer::from_path(&path)?;
            for v in vs.iter() {
                wtr.write_record(&[v.to_string()])?;
            }
            wtr.flush()?;
            info!("Saved statistic {} to {:?}", name, path);
        }
        Ok(())
    }
}

/// Outcome of [`RolloutProcedure::train`](crate::RolloutProcedure::train).
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    /// Number of finished episodes.
    pub episodes: usize,

    /// Number of environment steps.
    pub steps: usize,

    /// Best episode return.
    pub best_return: Option<f32>,

    /// `true` if training ended before the episode budget.
    pub stopped: bool,

    /// Returns and lengths of every episode.
    pub statistics: StatisticCollection,
}
