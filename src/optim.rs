//! Learning-rate schedule and the Adam optimizer driving every PPO step.

#[cfg(feature = "rl-nn")]
use tch::nn::{self, OptimizerConfig};

#[cfg(feature = "rl-nn")]
use crate::error::Result;

/// Adam denominator epsilon.
pub const ADAM_EPS: f64 = 1e-5;

/// Learning rate as a function of the optimizer step count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    Constant(f64),
    /// Decays linearly from `base` toward zero, one notch per completed update
    /// (`num_minibatches * update_epochs` optimizer steps).
    Linear {
        base: f64,
        num_minibatches: usize,
        update_epochs: usize,
        num_updates: usize,
    },
}

impl LearningRate {
    /// Learning rate for the optimizer step with index `count`.
    pub fn at(&self, count: u64) -> f64 {
        match *self {
            LearningRate::Constant(lr) => lr,
            LearningRate::Linear {
                base,
                num_minibatches,
                update_epochs,
                num_updates,
            } => {
                let steps_per_update = (num_minibatches * update_epochs).max(1) as u64;
                let completed = (count / steps_per_update) as f64;
                let frac = 1.0 - completed / num_updates.max(1) as f64;
                base * frac
            }
        }
    }
}

/// Adam over every trainable variable of `vs`, starting at `learning_rate.at(0)`.
///
/// Gradient clipping happens at step time through
/// [`nn::Optimizer::backward_step_clip_norm`].
#[cfg(feature = "rl-nn")]
pub fn adam(vs: &nn::VarStore, learning_rate: &LearningRate) -> Result<nn::Optimizer> {
    let opt = nn::Adam {
        eps: ADAM_EPS,
        ..Default::default()
    }
    .build(vs, learning_rate.at(0))?;
    Ok(opt)
}
