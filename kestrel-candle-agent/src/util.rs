//! Utilities.
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Tensor};
use candle_nn::VarMap;
use kestrel_core::KestrelError;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Critic loss type.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

impl Default for CriticLoss {
    fn default() -> Self {
        Self::Mse
    }
}

impl CriticLoss {
    /// Computes the loss between predictions and targets.
    pub fn compute(&self, pred: &Tensor, tgt: &Tensor) -> Result<Tensor> {
        match self {
            Self::Mse => Ok(candle_nn::loss::mse(pred, tgt)?),
            Self::SmoothL1 => smooth_l1_loss(pred, tgt),
        }
    }
}

fn lock_err<T>(_: T) -> anyhow::Error {
    anyhow!("VarMap lock is poisoned")
}

fn check_same_keys(dest: &[&String], src: &BTreeMap<String, Tensor>) -> Result<()> {
    if dest.len() != src.len() || dest.iter().any(|k| !src.contains_key(*k)) {
        return Err(KestrelError::ShapeMismatch {
            expected: format!("{} parameters", dest.len()),
            found: format!("{} parameters", src.len()),
        }
        .into());
    }
    Ok(())
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    let src = named_tensors(src)?;
    let dest = dest.data().lock().map_err(lock_err)?;
    check_same_keys(&dest.keys().collect::<Vec<_>>(), &src)?;
    trace!("Soft update of {} variables, tau = {}", dest.len(), tau);

    for (k, v_dest) in dest.iter() {
        let t_src = src.get(k).context("missing source variable")?;
        let t = (t_src.affine(tau, 0.0)? + v_dest.as_tensor().affine(1.0 - tau, 0.0)?)?;
        v_dest.set(&t)?;
    }

    Ok(())
}

/// Overwrites every variable of `dest` with the variable of the same name in `src`.
pub fn copy_params(dest: &VarMap, src: &VarMap) -> Result<()> {
    let src = named_tensors(src)?;
    let dest = dest.data().lock().map_err(lock_err)?;
    check_same_keys(&dest.keys().collect::<Vec<_>>(), &src)?;
    trace!("Hard copy of {} variables", dest.len());

    for (k, v_dest) in dest.iter() {
        let t_src = src.get(k).context("missing source variable")?;
        v_dest.set(t_src)?;
    }

    Ok(())
}

/// Detached copies of the variables, sorted by name.
pub fn named_tensors(varmap: &VarMap) -> Result<BTreeMap<String, Tensor>> {
    let data = varmap.data().lock().map_err(lock_err)?;
    data.iter()
        .map(|(k, v)| Ok((k.clone(), v.as_tensor().copy()?.detach())))
        .collect()
}

/// Sets the variables of `varmap` from tensors keyed by name.
pub fn set_named_tensors(varmap: &VarMap, tensors: &BTreeMap<String, Tensor>) -> Result<()> {
    let data = varmap.data().lock().map_err(lock_err)?;
    check_same_keys(&data.keys().collect::<Vec<_>>(), tensors)?;
    for (k, v) in data.iter() {
        let t = tensors.get(k).context("missing variable")?;
        v.set(t)?;
    }
    Ok(())
}

/// Regression target `reward + gamma * next_value`, or `reward` where `terminal` is set.
///
/// `terminal` is a `u8` mask. Terminal rows select `reward` as is, so they
/// do not depend on `next_value` at all.
pub fn bootstrapped_target(
    reward: &Tensor,
    terminal: &Tensor,
    next_value: &Tensor,
    gamma: f64,
) -> Result<Tensor> {
    let bootstrapped = (reward + next_value.affine(gamma, 0.0)?)?;
    Ok(terminal.where_cond(reward, &bootstrapped)?)
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = m1.affine(-1.0, 1.0)?;
    let quad = (m1 * d.sqr()?.affine(0.5, 0.0)?)?;
    let lin = (m2 * d.affine(1.0, -0.5)?)?;
    Ok((quad + lin)?.mean_all()?)
}

/// Stacks rows of equal length into a `(rows.len(), dim)` tensor.
pub fn rows_to_tensor<'a, I>(rows: I, dim: usize, device: &candle_core::Device) -> Result<Tensor>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut data = vec![];
    let mut n = 0;
    for row in rows {
        if row.len() != dim {
            return Err(KestrelError::ShapeMismatch {
                expected: format!("[{}]", dim),
                found: format!("[{}]", row.len()),
            }
            .into());
        }
        data.extend_from_slice(row);
        n += 1;
    }
    Ok(Tensor::from_vec(data, (n, dim), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::Init;

    fn varmap(values: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((values.len(),), "var1", init, DType::F32, &Device::Cpu)?;
        let t = Tensor::from_slice(values, (values.len(),), &Device::Cpu)?;
        set_named_tensors(&vm, &BTreeMap::from([("var1".to_string(), t)]))?;
        Ok(vm)
    }

    fn values(vm: &VarMap) -> Result<Vec<f32>> {
        Ok(named_tensors(vm)?["var1"].to_vec1::<f32>()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let vm_src = varmap(&[1.0, 2.0, 3.0])?;
        let vm_dest = varmap(&[4.0, 5.0, 6.0])?;
        track(&vm_dest, &vm_src, tau)?;

        let expected = [1.9f32, 2.9, 3.9];
        for (v, e) in values(&vm_dest)?.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-6);
        }
        assert_eq!(values(&vm_src)?, vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_copy_params_is_exact_and_unaliased() -> Result<()> {
        let vm_src = varmap(&[0.1, -7.25, 3.5])?;
        let vm_dest = varmap(&[0.0, 0.0, 0.0])?;
        copy_params(&vm_dest, &vm_src)?;
        assert_eq!(values(&vm_dest)?, vec![0.1, -7.25, 3.5]);

        // Writing the source afterwards leaves the copy untouched.
        let t = Tensor::from_slice(&[9f32, 9.0, 9.0], (3,), &Device::Cpu)?;
        set_named_tensors(&vm_src, &BTreeMap::from([("var1".to_string(), t)]))?;
        assert_eq!(values(&vm_dest)?, vec![0.1, -7.25, 3.5]);
        Ok(())
    }

    #[test]
    fn test_mismatched_varmaps() -> Result<()> {
        let vm_src = varmap(&[1.0])?;
        let vm_dest = VarMap::new();
        vm_dest.get((1,), "other", Init::Const(0.0), DType::F32, &Device::Cpu)?;
        assert!(copy_params(&vm_dest, &vm_src).is_err());
        assert!(track(&vm_dest, &vm_src, 0.5).is_err());
        Ok(())
    }

    #[test]
    fn test_terminal_target_equals_reward() -> Result<()> {
        let device = Device::Cpu;
        let reward = Tensor::from_slice(&[1.5f32, -0.5, 2.0], (3,), &device)?;
        let terminal = Tensor::from_slice(&[1u8, 0, 1], (3,), &device)?;
        let next_value = Tensor::from_slice(&[f32::NAN, 10.0, 1e30], (3,), &device)?;

        let tgt = bootstrapped_target(&reward, &terminal, &next_value, 0.9)?.to_vec1::<f32>()?;
        assert_eq!(tgt[0], 1.5);
        assert_eq!(tgt[2], 2.0);
        assert!((tgt[1] - 8.5).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let device = Device::Cpu;
        let x = Tensor::from_slice(&[0.0f32, 0.0], (2,), &device)?;
        let y = Tensor::from_slice(&[0.5f32, 3.0], (2,), &device)?;
        // (0.5 * 0.25 + (3.0 - 0.5)) / 2
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - 1.3125).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_rows_to_tensor() -> Result<()> {
        let rows = vec![vec![1f32, 2.0], vec![3.0, 4.0]];
        let t = rows_to_tensor(rows.iter().map(|r| r.as_slice()), 2, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 2]);
        assert!(rows_to_tensor(rows.iter().map(|r| &r[..1]), 2, &Device::Cpu).is_err());
        Ok(())
    }
}
