//! Observation and action types consumed by the agents of this crate.
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use kestrel_core::{Act, KestrelError, Obs, Space};
use ndarray::Array2;

/// Feature vectors, one row per sub-environment.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureObs(pub Array2<f32>);

impl FeatureObs {
    /// A single observation.
    pub fn from_row(row: Vec<f32>) -> Result<Self> {
        let n = row.len();
        Ok(Self(Array2::from_shape_vec((1, n), row)?))
    }

    /// Converts to a `(len, dim)` tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let (n, dim) = self.0.dim();
        let data = self.0.iter().copied().collect::<Vec<_>>();
        Ok(Tensor::from_vec(data, (n, dim), device)?)
    }
}

impl Obs for FeatureObs {
    type Item = Vec<f32>;

    fn len(&self) -> usize {
        self.0.nrows()
    }

    fn item(&self, ix: usize) -> Vec<f32> {
        self.0.row(ix).to_vec()
    }
}

/// Discrete actions, one per sub-environment.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteAct(pub Vec<i64>);

impl Act for DiscreteAct {
    type Item = i64;

    fn len(&self) -> usize {
        self.0.len()
    }

    fn item(&self, ix: usize) -> i64 {
        self.0[ix]
    }
}

/// Continuous actions, one row per sub-environment.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousAct(pub Array2<f32>);

impl ContinuousAct {
    /// Converts a `(len, dim)` tensor.
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        let (n, dim) = t.dims2()?;
        let data = t.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self(Array2::from_shape_vec((n, dim), data)?))
    }
}

impl Act for ContinuousAct {
    type Item = Vec<f32>;

    fn len(&self) -> usize {
        self.0.nrows()
    }

    fn item(&self, ix: usize) -> Vec<f32> {
        self.0.row(ix).to_vec()
    }
}

/// Actions that can be read off the output of a policy network.
pub trait PolicyAct: Act + Sized {
    /// Width of the network output for `space`.
    fn output_dim(space: &Space) -> Result<usize>;

    /// Whether the network output is squashed with tanh.
    fn squashed() -> bool;

    /// Converts a `(len, output_dim)` tensor to actions in `space`.
    fn from_output(out: &Tensor, space: &Space) -> Result<Self>;
}

impl PolicyAct for DiscreteAct {
    fn output_dim(space: &Space) -> Result<usize> {
        match space {
            Space::Discrete { n } => Ok(*n),
            _ => Err(KestrelError::Configuration(format!(
                "discrete actions require a discrete action space, got {}",
                space
            ))
            .into()),
        }
    }

    fn squashed() -> bool {
        false
    }

    /// Takes the index of the largest output.
    fn from_output(out: &Tensor, _space: &Space) -> Result<Self> {
        let ix = out.argmax(D::Minus1)?.to_vec1::<u32>()?;
        Ok(Self(ix.into_iter().map(|i| i as i64).collect()))
    }
}

impl PolicyAct for ContinuousAct {
    fn output_dim(space: &Space) -> Result<usize> {
        match space {
            Space::Box { low, .. } => Ok(low.len()),
            _ => Err(KestrelError::Configuration(format!(
                "continuous actions require a box action space, got {}",
                space
            ))
            .into()),
        }
    }

    fn squashed() -> bool {
        true
    }

    /// Maps outputs in `[-1, 1]` linearly onto the bounds of `space`.
    fn from_output(out: &Tensor, space: &Space) -> Result<Self> {
        let scaled = scale_to_bounds(out, space)?;
        Self::from_tensor(&scaled)
    }
}

/// Maps a tensor with values in `[-1, 1]` onto `[low, high]` per dimension.
pub(crate) fn scale_to_bounds(xs: &Tensor, space: &Space) -> Result<Tensor> {
    let (low, _) = space.bounds().ok_or_else(|| {
        KestrelError::Configuration(format!("expected a box space, got {}", space))
    })?;
    let device = xs.device();
    let dim = low.len();
    let low = Tensor::from_slice(low, (1, dim), device)?;
    let span = Tensor::from_vec(space.span(), (1, dim), device)?;
    let unit = xs.affine(0.5, 0.5)?;
    Ok(unit.broadcast_mul(&span)?.broadcast_add(&low)?)
}

/// Clamps each column of `xs` to the bounds of `space`.
pub(crate) fn clamp_to_bounds(xs: &Tensor, space: &Space) -> Result<Tensor> {
    let (low, high) = space.bounds().ok_or_else(|| {
        KestrelError::Configuration(format!("expected a box space, got {}", space))
    })?;
    let device = xs.device();
    let dim = low.len();
    let low = Tensor::from_slice(low, (1, dim), device)?;
    let high = Tensor::from_slice(high, (1, dim), device)?;
    Ok(xs.broadcast_maximum(&low)?.broadcast_minimum(&high)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_feature_obs() -> Result<()> {
        let obs = FeatureObs(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(obs.len(), 3);
        assert_eq!(obs.item(1), vec![3.0, 4.0]);
        let t = obs.to_tensor(&Device::Cpu)?;
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.to_vec2::<f32>()?[2], vec![5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_discrete_from_output() -> Result<()> {
        let out = Tensor::new(&[[0.1f32, 0.9, 0.0], [2.0, -1.0, 1.0]], &Device::Cpu)?;
        let act = DiscreteAct::from_output(&out, &Space::discrete(3))?;
        assert_eq!(act, DiscreteAct(vec![1, 0]));
        assert!(DiscreteAct::output_dim(&Space::bounded(vec![0.0], vec![1.0])?).is_err());
        Ok(())
    }

    #[test]
    fn test_continuous_from_output() -> Result<()> {
        let space = Space::bounded(vec![-2.0, 0.0], vec![2.0, 10.0])?;
        let out = Tensor::new(&[[-1.0f32, 1.0], [0.0, 0.0]], &Device::Cpu)?;
        let act = ContinuousAct::from_output(&out, &space)?;
        assert_eq!(act.item(0), vec![-2.0, 10.0]);
        assert_eq!(act.item(1), vec![0.0, 5.0]);

        let xs = Tensor::new(&[[-3.0f32, 11.0]], &Device::Cpu)?;
        let clamped = clamp_to_bounds(&xs, &space)?;
        assert_eq!(clamped.to_vec2::<f32>()?, vec![vec![-2.0, 10.0]]);
        Ok(())
    }
}
