//! Ring buffer of transitions.
use super::{ReplayMemoryConfig, Transition};
use crate::error::KestrelError;
use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A bounded replay memory.
///
/// [`ReplayMemory::sample`] borrows the memory mutably, so references it
/// returns cannot outlive the next [`ReplayMemory::add`].
pub struct ReplayMemory<O, A> {
    capacity: usize,
    i: usize,
    buf: Vec<Transition<O, A>>,
    rng: StdRng,
}

impl<O, A> ReplayMemory<O, A> {
    /// Builds a replay memory.
    ///
    /// Fails if the capacity is zero.
    pub fn build(config: &ReplayMemoryConfig) -> Result<Self, KestrelError> {
        if config.capacity == 0 {
            return Err(KestrelError::Configuration(
                "capacity of a replay memory must be positive".to_string(),
            ));
        }

        Ok(Self {
            capacity: config.capacity,
            i: 0,
            buf: Vec::with_capacity(config.capacity),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Stores a transition, overwriting the oldest one when full.
    pub fn add(&mut self, transition: Transition<O, A>) {
        if self.buf.len() < self.capacity {
            self.buf.push(transition);
        } else {
            self.buf[self.i] = transition;
        }
        self.i = (self.i + 1) % self.capacity;
    }

    /// Draws `batch_size` transitions uniformly with replacement.
    ///
    /// Fails with [`KestrelError::InsufficientData`] if fewer than
    /// `batch_size` transitions are stored or the memory is empty.
    pub fn sample(&mut self, batch_size: usize) -> Result<Vec<&Transition<O, A>>, KestrelError> {
        let size = self.buf.len();
        if size == 0 || size < batch_size {
            return Err(KestrelError::InsufficientData {
                requested: batch_size,
                stored: size,
            });
        }
        trace!("Sample {} of {} transitions", batch_size, size);

        let ixs = (0..batch_size)
            .map(|_| self.rng.gen_range(0..size))
            .collect::<Vec<_>>();
        let buf = &self.buf;
        Ok(ixs.into_iter().map(|ix| &buf[ix]).collect())
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum number of stored transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over stored transitions from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition<O, A>> {
        // Until the first wrap `i == len`, so `older` is empty.
        let (newer, older) = self.buf.split_at(self.i);
        older.iter().chain(newer.iter())
    }

    /// Drops all stored transitions.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.i = 0;
    }
}
