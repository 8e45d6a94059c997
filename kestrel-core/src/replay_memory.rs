//! Bounded replay memory.
//!
//! [`ReplayMemory`] is a ring buffer of [`Transition`]s. Once it holds
//! `capacity` transitions, every insertion overwrites the oldest one.
//! Batches are drawn uniformly with replacement from the stored
//! transitions.
//!
//! ```rust
//! use kestrel_core::{ReplayMemory, ReplayMemoryConfig, Transition};
//!
//! let config = ReplayMemoryConfig::default().capacity(2).seed(7);
//! let mut memory = ReplayMemory::build(&config).unwrap();
//! for i in 0..3 {
//!     memory.add(Transition::new(i, 0u8, 1.0, i + 1, false));
//! }
//! assert_eq!(memory.len(), 2);
//! assert_eq!(memory.sample(2).unwrap().len(), 2);
//! ```
mod base;
mod config;
mod transition;
pub use base::ReplayMemory;
pub use config::ReplayMemoryConfig;
pub use transition::Transition;
