//! Core functionalities.
mod agent;
mod env;
mod policy;
mod state;
mod step;
pub use agent::{Agent, AgentKind};
pub use env::{Env, EnvSpec, Space};
pub use policy::Policy;
pub use state::{AgentPhase, AgentState};
use std::fmt::Debug;
pub use step::Step;

/// A set of observations of an environment.
///
/// An environment may run several sub-environments in lockstep. In that
/// case [`Obs::len`] returns the number of sub-environments and
/// [`Obs::item`] extracts the observation of one of them, which is what
/// gets stored in a [`Transition`](crate::Transition).
pub trait Obs: Clone + Debug {
    /// Observation of a single sub-environment.
    type Item: Clone + Debug;

    /// Returns the number of observations in the object.
    fn len(&self) -> usize;

    /// Returns the observation of the `ix`-th sub-environment.
    fn item(&self, ix: usize) -> Self::Item;
}

/// A set of actions of the environment.
pub trait Act: Clone + Debug {
    /// Action of a single sub-environment.
    type Item: Clone + Debug;

    /// Returns the number of actions in the object.
    fn len(&self) -> usize;

    /// Returns the action taken in the `ix`-th sub-environment.
    fn item(&self, ix: usize) -> Self::Item;
}

/// Observation of a single sub-environment of `E`.
pub type ObsItem<E> = <<E as Env>::Obs as Obs>::Item;

/// Action of a single sub-environment of `E`.
pub type ActItem<E> = <<E as Env>::Act as Act>::Item;
