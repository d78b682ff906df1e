//! Clipped PPO objective on tch tensors.
//!
//! [`ppo_loss`] returns the total as a graph-attached scalar; the updater
//! hands it to the optimizer and autograd does the rest.

use tch::{Device, Kind, Tensor};

use super::metrics::LossInfo;
use super::minibatch::FlatBatch;
use crate::error::{IppoError, Result};
use crate::policy::{to_tensor, PolicyOutput};

/// Variance floor used when normalizing advantages.
pub const ADV_NORM_EPS: f64 = 1e-8;

/// Loss weights and clip range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossCoefficients {
    pub clip_eps: f64,
    pub vf_coef: f64,
    pub ent_coef: f64,
}

/// A [`FlatBatch`] moved onto a device.
#[derive(Debug)]
pub struct TensorBatch {
    /// `(n, obs_dim)` double.
    pub obs: Tensor,
    /// `(n,)` int64.
    pub actions: Tensor,
    pub values: Tensor,
    pub log_probs: Tensor,
    pub advantages: Tensor,
    pub targets: Tensor,
}

impl TensorBatch {
    pub fn new(batch: &FlatBatch, device: Device) -> Self {
        let actions: Vec<i64> = batch.actions.iter().map(|&a| a as i64).collect();
        let column = |v: &[f64]| Tensor::from_slice(v).to_device(device);
        Self {
            obs: to_tensor(&batch.obs, device),
            actions: Tensor::from_slice(&actions).to_device(device),
            values: column(&batch.values),
            log_probs: column(&batch.log_probs),
            advantages: column(&batch.advantages),
            targets: column(&batch.targets),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.size().first().map_or(0, |&n| n as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Differentiable total plus the scalar terms for logging.
#[derive(Debug)]
pub struct PpoLoss {
    pub total: Tensor,
    pub info: LossInfo,
}

/// `(adv - mean) / (std + 1e-8)` with the population standard deviation.
pub fn normalize_advantages(advantages: &Tensor) -> Tensor {
    (advantages - advantages.mean(Kind::Double)) / (advantages.std(false) + ADV_NORM_EPS)
}

/// Evaluates the PPO loss of `output` (the current network on `batch.obs`).
///
/// * value loss: `0.5 * mean(max((v - target)^2, (v_clipped - target)^2))`
///   with `v_clipped = old_v + clip(v - old_v, -eps, eps)`
/// * actor loss: `-mean(min(ratio * adv, clip(ratio, 1-eps, 1+eps) * adv))`
///   with `ratio = exp(new_lp - old_lp)` and normalized advantages
/// * total: `actor + vf_coef * value - ent_coef * entropy`
pub fn ppo_loss(
    output: &PolicyOutput,
    batch: &TensorBatch,
    coefs: &LossCoefficients,
) -> Result<PpoLoss> {
    let n = batch.len();
    if n == 0 {
        return Err(IppoError::shape("ppo_loss", "a non-empty minibatch", 0));
    }
    if output.values.size() != [n as i64] || output.dist.len() != n {
        return Err(IppoError::shape(
            "ppo_loss",
            n,
            format!(
                "{:?} values, {} distributions",
                output.values.size(),
                output.dist.len()
            ),
        ));
    }
    let eps = coefs.clip_eps;

    // Value loss
    let values = &output.values;
    let values_clipped = &batch.values + (values - &batch.values).clamp(-eps, eps);
    let value_losses = (values - &batch.targets).square();
    let value_losses_clipped = (values_clipped - &batch.targets).square();
    let value_loss = 0.5 * value_losses.maximum(&value_losses_clipped).mean(Kind::Double);

    // Actor loss
    let log_prob = output.dist.log_prob(&batch.actions)?;
    let log_ratio = &log_prob - &batch.log_probs;
    let ratio = log_ratio.exp();
    let advantages = normalize_advantages(&batch.advantages);
    let loss_actor1 = &ratio * &advantages;
    let loss_actor2 = ratio.clamp(1.0 - eps, 1.0 + eps) * &advantages;
    let actor_loss = -loss_actor1.minimum(&loss_actor2).mean(Kind::Double);

    // Entropy bonus
    let entropy = output.dist.entropy().mean(Kind::Double);

    let total = &actor_loss + coefs.vf_coef * &value_loss - coefs.ent_coef * &entropy;

    let approx_kl = (-&log_ratio).mean(Kind::Double);
    let clip_fraction = (&ratio - 1.0)
        .abs()
        .gt(eps)
        .to_kind(Kind::Double)
        .mean(Kind::Double);
    let info = LossInfo {
        total: f64::try_from(&total)?,
        value_loss: f64::try_from(&value_loss)?,
        actor_loss: f64::try_from(&actor_loss)?,
        entropy: f64::try_from(&entropy)?,
        approx_kl: f64::try_from(&approx_kl)?,
        clip_fraction: f64::try_from(&clip_fraction)?,
    };
    Ok(PpoLoss { total, info })
}
