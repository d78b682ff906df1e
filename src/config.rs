//! Training configuration for IPPO.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{IppoError, Result};
use crate::optim::LearningRate;

/// Hyperparameters consumed by the training orchestrator.
///
/// Sizes that depend on the environment (actor count, minibatch size) are
/// derived from `num_agents` at training time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IppoConfig {
    /// Adam learning rate (initial value when annealing).
    pub lr: f64,
    /// Number of environment instances stepped in lockstep.
    pub num_envs: usize,
    /// Rollout horizon per update.
    pub num_steps: usize,
    /// Environment steps budget, counted per environment instance.
    pub total_timesteps: usize,
    /// PPO epochs over each collected trajectory.
    pub update_epochs: usize,
    /// Minibatches per epoch.
    pub num_minibatches: usize,
    /// Discount factor γ.
    pub gamma: f64,
    /// GAE λ.
    pub gae_lambda: f64,
    /// PPO clip ε, shared by the policy ratio and the value clip.
    pub clip_eps: f64,
    /// Entropy bonus coefficient.
    pub ent_coef: f64,
    /// Value loss coefficient.
    pub vf_coef: f64,
    /// Global gradient norm ceiling.
    pub max_grad_norm: f64,
    /// Linearly decay the learning rate to zero over training.
    pub anneal_lr: bool,
    /// Root seed.
    pub seed: u64,
    /// Independent replicates run by [`crate::IppoTrainer::train_seeds`].
    pub num_seeds: usize,
}

impl Default for IppoConfig {
    fn default() -> Self {
        Self {
            lr: 2.5e-4,
            num_envs: 16,
            num_steps: 128,
            total_timesteps: 500_000,
            update_epochs: 4,
            num_minibatches: 4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_eps: 0.2,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            anneal_lr: true,
            seed: 30,
            num_seeds: 1,
        }
    }
}

impl IppoConfig {
    /// Actor slots: one per (agent, environment instance).
    pub fn num_actors(&self, num_agents: usize) -> usize {
        num_agents * self.num_envs
    }

    /// Number of collect/update iterations the budget allows.
    pub fn num_updates(&self) -> usize {
        if self.num_steps == 0 || self.num_envs == 0 {
            return 0;
        }
        self.total_timesteps / self.num_steps / self.num_envs
    }

    /// Flattened trajectory size per update.
    pub fn batch_size(&self, num_agents: usize) -> usize {
        self.num_actors(num_agents) * self.num_steps
    }

    /// Rows per minibatch.
    pub fn minibatch_size(&self, num_agents: usize) -> usize {
        if self.num_minibatches == 0 {
            return 0;
        }
        self.batch_size(num_agents) / self.num_minibatches
    }

    /// Learning-rate schedule implied by `lr` and `anneal_lr`.
    pub fn learning_rate(&self) -> LearningRate {
        if self.anneal_lr {
            LearningRate::Linear {
                base: self.lr,
                num_minibatches: self.num_minibatches,
                update_epochs: self.update_epochs,
                num_updates: self.num_updates(),
            }
        } else {
            LearningRate::Constant(self.lr)
        }
    }

    /// Rejects configurations that could not run a single consistent update.
    pub fn validate(&self, num_agents: usize) -> Result<()> {
        let positive = [
            ("num_agents", num_agents),
            ("num_envs", self.num_envs),
            ("num_steps", self.num_steps),
            ("update_epochs", self.update_epochs),
            ("num_minibatches", self.num_minibatches),
            ("num_seeds", self.num_seeds),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(IppoError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.num_updates() == 0 {
            return Err(IppoError::InvalidConfig(format!(
                "total_timesteps {} is smaller than one rollout of {} steps x {} envs",
                self.total_timesteps, self.num_steps, self.num_envs
            )));
        }
        for (name, value) in [("gamma", self.gamma), ("gae_lambda", self.gae_lambda)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(IppoError::InvalidConfig(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.lr > 0.0) || !(self.clip_eps >= 0.0) || !(self.max_grad_norm > 0.0) {
            return Err(IppoError::InvalidConfig(
                "lr and max_grad_norm must be positive, clip_eps non-negative".to_string(),
            ));
        }
        let batch_size = self.batch_size(num_agents);
        let minibatch_size = self.minibatch_size(num_agents);
        if minibatch_size == 0 || minibatch_size * self.num_minibatches != batch_size {
            return Err(IppoError::BatchSizeMismatch {
                batch_size,
                minibatch_size,
                num_minibatches: self.num_minibatches,
            });
        }
        Ok(())
    }
}
