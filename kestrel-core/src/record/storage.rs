//! Aggregation of records.
use super::{Record, RecordValue};
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them into one.
///
/// Scalars stored under the same key more than once are summarised as
/// `{key}_min`, `{key}_max`, `{key}_mean` and `{key}_median`. Other values
/// keep the most recent one.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::INFINITY, f32::min)
}

fn max(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

fn median(mut vs: Vec<f32>) -> f32 {
    vs.sort_by(|x, y| x.total_cmp(y));
    vs[vs.len() / 2]
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn aggregate_key(&self, key: &str) -> Record {
        let values = self
            .data
            .iter()
            .filter_map(|r| r.get(key))
            .collect::<Vec<_>>();
        let scalars = values
            .iter()
            .filter_map(|v| match v {
                RecordValue::Scalar(v) => Some(*v),
                _ => None,
            })
            .collect::<Vec<_>>();

        match (values.len(), scalars.len() == values.len()) {
            (1, _) | (_, false) => match values.last() {
                Some(v) => Record::from_slice(&[(key, (*v).clone())]),
                None => Record::empty(),
            },
            (_, true) => Record::from_slice(&[
                (format!("{}_min", key), RecordValue::Scalar(min(&scalars))),
                (format!("{}_max", key), RecordValue::Scalar(max(&scalars))),
                (format!("{}_mean", key), RecordValue::Scalar(mean(&scalars))),
                (format!("{}_median", key), RecordValue::Scalar(median(scalars))),
            ]),
        }
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();
        for key in self.keys().iter() {
            record.merge_inplace(self.aggregate_key(key));
        }
        self.data.clear();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [3.0, 1.0, 2.0] {
            storage.store(Record::from_scalar("loss", v));
        }
        storage.store(Record::from_scalar("once", 7.0));

        let r = storage.aggregate();
        assert_eq!(r.get_scalar("loss_min"), Ok(1.0));
        assert_eq!(r.get_scalar("loss_max"), Ok(3.0));
        assert_eq!(r.get_scalar("loss_mean"), Ok(2.0));
        assert_eq!(r.get_scalar("loss_median"), Ok(2.0));
        assert_eq!(r.get_scalar("once"), Ok(7.0));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_latest_non_scalar() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_slice(&[("tag", RecordValue::String("a".into()))]));
        storage.store(Record::from_slice(&[("tag", RecordValue::String("b".into()))]));
        let r = storage.aggregate();
        assert_eq!(r.get_string("tag"), Ok("b".to_string()));
    }
}
