//! Interface of neural networks used in RL agents.
use crate::util::{copy_params, track};
use anyhow::Result;
use candle_core::{DType, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use kestrel_core::target_sync::Trackable;
use log::info;
use std::path::Path;

/// Neural network model not owing its [`VarMap`] internally.
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`VarBuilder`] and [`SubModel1::Config`].
    fn build(vb: VarBuilder, config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// Neural network model not owing its [`VarMap`] internally.
///
/// The difference from [`SubModel1`] is that this trait takes two inputs.
pub trait SubModel2 {
    /// Configuration from which [`SubModel2`] is constructed.
    type Config;

    /// Input of the [`SubModel2`].
    type Input1;

    /// Input of the [`SubModel2`].
    type Input2;

    /// Output of the [`SubModel2`].
    type Output;

    /// Builds [`SubModel2`].
    fn build(vb: VarBuilder, config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Self::Output>;
}

/// A sub-model together with the [`VarMap`] holding its parameters.
///
/// Online and target networks are two instances built from the same
/// configuration; [`Trackable`] copies or blends parameters between them by
/// name.
pub struct Model<M> {
    varmap: VarMap,
    inner: M,
}

impl<M> Model<M> {
    /// Creates a fresh [`VarMap`] and builds the sub-model on it with `f`.
    pub fn build_with<F>(device: &Device, f: F) -> Result<Self>
    where
        F: FnOnce(VarBuilder) -> Result<M>,
    {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let inner = f(vb)?;
        Ok(Self { varmap, inner })
    }

    /// The sub-model.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Parameters of the sub-model.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Trainable variables, to be handed to an optimizer.
    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Saves parameters in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads parameters in place. Optimizers holding the variables stay attached.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load model from {:?}", path.as_ref());
        Ok(())
    }
}

impl<M: SubModel1> Model<M> {
    /// Builds a [`SubModel1`].
    pub fn build(config: &M::Config, device: &Device) -> Result<Self> {
        Self::build_with(device, |vb| M::build(vb, config))
    }

    /// Forward pass of the [`SubModel1`].
    pub fn forward(&self, input: &M::Input) -> Result<M::Output> {
        self.inner.forward(input)
    }
}

impl<M> Trackable for Model<M> {
    fn hard_copy_from(&mut self, online: &Self) -> Result<()> {
        copy_params(&self.varmap, &online.varmap)
    }

    fn soft_update_from(&mut self, online: &Self, tau: f64) -> Result<()> {
        track(&self.varmap, &online.varmap, tau)
    }
}
