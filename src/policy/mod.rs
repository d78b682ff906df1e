//! Actor-critic interface and its tch implementation.
//!
//! The training core only relies on [`ActorCritic`] and [`NetworkSpec`]: it
//! never inspects the architecture, and gets gradients from libtorch
//! autograd. This module is only available with the `rl-nn` feature.

pub mod categorical;
pub mod mlp;

use tch::{nn, Device, Kind, Tensor};

use crate::array::Array2;
use crate::error::{IppoError, Result};
use crate::key::PrngKey;

pub use categorical::Categorical;
pub use mlp::{Activation, MlpActorCritic, MlpSpec};

/// Network outputs for a batch of observations.
#[derive(Debug)]
pub struct PolicyOutput {
    /// Action distribution, one row per observation.
    pub dist: Categorical,
    /// Value estimate per observation, `(batch,)`.
    pub values: Tensor,
}

/// Policy/value function with discrete actions, backed by a variable store.
pub trait ActorCritic {
    fn obs_dim(&self) -> usize;

    fn num_actions(&self) -> usize;

    fn var_store(&self) -> &nn::VarStore;

    /// Logits `(batch, num_actions)` and values `(batch,)` for a
    /// `(batch, obs_dim)` input.
    fn forward(&self, obs: &Tensor) -> (Tensor, Tensor);

    fn device(&self) -> Device {
        self.var_store().device()
    }

    /// Checked [`ActorCritic::forward`], wrapping the logits in a distribution.
    fn apply(&self, obs: &Tensor) -> Result<PolicyOutput> {
        let size = obs.size();
        if size.len() != 2 || size[1] != self.obs_dim() as i64 {
            return Err(IppoError::shape(
                "ActorCritic::apply",
                format!("(batch, {})", self.obs_dim()),
                format!("{:?}", size),
            ));
        }
        let (logits, values) = self.forward(obs);
        Ok(PolicyOutput {
            dist: Categorical::new(&logits),
            values,
        })
    }

    /// Every variable flattened, in name order.
    fn flat_params(&self) -> Result<Vec<f64>> {
        let variables = self.var_store().variables();
        let mut names: Vec<&String> = variables.keys().collect();
        names.sort();
        let mut flat = Vec::new();
        for name in names {
            flat.extend(to_vec(&variables[name])?);
        }
        Ok(flat)
    }
}

/// Architecture of an actor-critic, independent of any weights.
///
/// The trainer builds one fresh network per run from it, so independent
/// seeds never share variables.
pub trait NetworkSpec: Sync {
    type Network: ActorCritic + Send;

    fn num_actions(&self) -> usize;

    /// New network for `obs_dim` inputs, initialized from `key`.
    fn build(&self, obs_dim: usize, key: PrngKey) -> Result<Self::Network>;
}

/// `(rows, cols)` double tensor holding `values`.
pub fn to_tensor(values: &Array2<f64>, device: Device) -> Tensor {
    Tensor::from_slice(values.as_slice())
        .reshape([values.rows() as i64, values.cols() as i64])
        .to_device(device)
}

/// Flattened copy of `t` as `f64`, detached from the graph.
pub fn to_vec(t: &Tensor) -> Result<Vec<f64>> {
    Ok(Vec::<f64>::try_from(
        &t.detach().to_kind(Kind::Double).flatten(0, -1),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_round_trip_keeps_row_major_layout() {
        let a = Array2::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = to_tensor(&a, Device::Cpu);
        assert_eq!(t.size(), vec![2, 3]);
        assert_eq!(t.double_value(&[1, 0]), 4.0);
        assert_eq!(to_vec(&t).unwrap(), a.as_slice());
    }
}
