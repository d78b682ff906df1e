//! Per-update training statistics.

use std::fmt;

use super::trajectory::Trajectory;
use crate::env::log_wrapper::{RETURNED_EPISODE, RETURNED_EPISODE_RETURNS};

/// Scalar loss terms of one minibatch, or their mean over several.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LossInfo {
    pub total: f64,
    pub value_loss: f64,
    pub actor_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,
}

impl LossInfo {
    /// Element-wise mean over several minibatches.
    pub fn mean(infos: &[LossInfo]) -> LossInfo {
        if infos.is_empty() {
            return LossInfo::default();
        }
        let n = infos.len() as f64;
        let sum = |f: fn(&LossInfo) -> f64| infos.iter().map(f).sum::<f64>() / n;
        LossInfo {
            total: sum(|l| l.total),
            value_loss: sum(|l| l.value_loss),
            actor_loss: sum(|l| l.actor_loss),
            entropy: sum(|l| l.entropy),
            approx_kl: sum(|l| l.approx_kl),
            clip_fraction: sum(|l| l.clip_fraction),
        }
    }
}

/// Statistics of one collect/estimate/update iteration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateMetrics {
    /// Zero-based update index.
    pub update: usize,
    /// Learning rate at the start of the update.
    pub learning_rate: f64,
    pub total_loss: f64,
    pub value_loss: f64,
    pub actor_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,
    /// Mean return of the episodes that finished during the rollout, if any.
    pub mean_episode_return: Option<f64>,
}

impl UpdateMetrics {
    pub fn new(
        update: usize,
        learning_rate: f64,
        loss: &LossInfo,
        trajectory: &Trajectory,
    ) -> Self {
        Self {
            update,
            learning_rate,
            total_loss: loss.total,
            value_loss: loss.value_loss,
            actor_loss: loss.actor_loss,
            entropy: loss.entropy,
            approx_kl: loss.approx_kl,
            clip_fraction: loss.clip_fraction,
            mean_episode_return: mean_episode_return(trajectory),
        }
    }
}

impl fmt::Display for UpdateMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "update={} lr={:.2e} loss={:.4} value={:.4} actor={:.4} entropy={:.4} kl={:.4}",
            self.update,
            self.learning_rate,
            self.total_loss,
            self.value_loss,
            self.actor_loss,
            self.entropy,
            self.approx_kl
        )?;
        if let Some(ret) = self.mean_episode_return {
            write!(f, " return={:.3}", ret)?;
        }
        Ok(())
    }
}

/// Mean of `returned_episode_returns` over the actor slots and steps flagged
/// by `returned_episode`.
///
/// `None` if the trajectory carries no episode statistics or no episode ended.
pub fn mean_episode_return(trajectory: &Trajectory) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for step in trajectory {
        let (Some(flags), Some(returns)) = (
            step.info.get(RETURNED_EPISODE),
            step.info.get(RETURNED_EPISODE_RETURNS),
        ) else {
            continue;
        };
        for (flag, ret) in flags.iter().zip(returns) {
            if *flag > 0.0 {
                sum += ret;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}
