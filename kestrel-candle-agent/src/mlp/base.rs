use super::MlpConfig;
use crate::model::{SubModel1, SubModel2};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Returns vector of linear modules from [`MlpConfig`].
fn create_linear_layers(prefix: &str, vs: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let dims = std::iter::once(config.in_dim)
        .chain(config.units.iter().copied())
        .chain(std::iter::once(config.out_dim))
        .collect::<Vec<_>>();
    let vs = vs.pp(prefix);

    dims.windows(2)
        .enumerate()
        .map(|(i, w)| Ok(linear(w[0], w[1], vs.pp(format!("ln{}", i)))?))
        .collect()
}

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
}

impl Mlp {
    fn _build(vs: VarBuilder, config: &MlpConfig) -> Result<Self> {
        let device = vs.device().clone();
        let layers = create_linear_layers("mlp", vs, config)?;

        Ok(Self {
            config: config.clone(),
            device,
            layers,
        })
    }

    fn _forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.to_device(&self.device)?;
        let n_layers = self.layers.len();

        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i + 1 < n_layers {
                xs = xs.relu()?;
            }
        }

        Ok(self.config.activation_out.forward(&xs)?)
    }
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        self._forward(xs)
    }

    fn build(vs: VarBuilder, config: &Self::Config) -> Result<Self> {
        Self::_build(vs, config)
    }
}

impl SubModel2 for Mlp {
    type Config = MlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    /// Concatenates the inputs along the last dimension.
    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Tensor> {
        let input1 = input1.to_device(&self.device)?;
        let input2 = input2.to_device(&self.device)?;
        let input = Tensor::cat(&[input1, input2], D::Minus1)?;
        self._forward(&input)
    }

    fn build(vs: VarBuilder, config: &Self::Config) -> Result<Self> {
        Self::_build(vs, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Model, Activation};

    #[test]
    fn test_shapes() -> Result<()> {
        let device = Device::Cpu;
        let config = MlpConfig::new(3, vec![8, 4], 2, Activation::Tanh);
        let model = Model::<Mlp>::build(&config, &device)?;
        // Three linear layers, each with a weight and a bias.
        assert_eq!(model.all_vars().len(), 6);

        let xs = Tensor::zeros((5, 3), candle_core::DType::F32, &device)?;
        let ys = model.forward(&xs)?;
        assert_eq!(ys.dims(), &[5, 2]);
        let ys = ys.flatten_all()?.to_vec1::<f32>()?;
        assert!(ys.iter().all(|y| y.abs() <= 1.0));
        Ok(())
    }

    #[test]
    fn test_linear_only_and_two_inputs() -> Result<()> {
        let device = Device::Cpu;
        let config = MlpConfig::new(3, vec![], 1, Activation::None);
        let model = Model::build_with(&device, |vb| <Mlp as SubModel2>::build(vb, &config))?;
        assert_eq!(model.all_vars().len(), 2);

        let obs = Tensor::ones((4, 2), candle_core::DType::F32, &device)?;
        let act = Tensor::ones((4, 1), candle_core::DType::F32, &device)?;
        let q = SubModel2::forward(model.inner(), &obs, &act)?;
        assert_eq!(q.dims(), &[4, 1]);
        Ok(())
    }
}
