//! Rollout collection, advantage estimation and PPO updates.
//!
//! Advantage estimation and batching work on host buffers; the loss, the
//! optimizer step, rollouts and the trainer need the `rl-nn` feature.

pub mod gae;
pub mod metrics;
pub mod minibatch;
pub mod trajectory;

#[cfg(feature = "rl-nn")]
pub mod ippo;
#[cfg(feature = "rl-nn")]
pub mod loss;
#[cfg(feature = "rl-nn")]
pub mod rollout;
#[cfg(feature = "rl-nn")]
pub mod update;

pub use gae::{calculate_gae, GaeOutput};
pub use metrics::{mean_episode_return, LossInfo, UpdateMetrics};
pub use minibatch::{check_batch_size, permutation, FlatBatch};
pub use trajectory::{Trajectory, Transition};

#[cfg(feature = "rl-nn")]
pub use ippo::{IppoTrainer, Phase, TrainOutput};
#[cfg(feature = "rl-nn")]
pub use loss::{normalize_advantages, ppo_loss, LossCoefficients, PpoLoss, TensorBatch};
#[cfg(feature = "rl-nn")]
pub use rollout::{RolloutCollector, RunnerState};
#[cfg(feature = "rl-nn")]
pub use update::{PolicyUpdater, TrainState};
