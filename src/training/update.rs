//! Minibatched clipped-PPO updates.

use std::fmt;

use tch::nn;
use tracing::trace;

use super::gae::GaeOutput;
use super::loss::{ppo_loss, LossCoefficients, TensorBatch};
use super::metrics::LossInfo;
use super::minibatch::{check_batch_size, FlatBatch};
use super::trajectory::Trajectory;
use crate::error::Result;
use crate::key::PrngKey;
use crate::optim::{adam, LearningRate};
use crate::policy::ActorCritic;

/// Network, its Adam optimizer and the learning-rate schedule.
pub struct TrainState<P> {
    pub network: P,
    pub optimizer: nn::Optimizer,
    pub learning_rate: LearningRate,
    /// Optimizer steps taken so far.
    pub step_count: u64,
}

impl<P: ActorCritic> TrainState<P> {
    pub fn new(network: P, learning_rate: LearningRate) -> Result<Self> {
        let optimizer = adam(network.var_store(), &learning_rate)?;
        Ok(Self {
            network,
            optimizer,
            learning_rate,
            step_count: 0,
        })
    }

    /// Learning rate of the next optimizer step.
    pub fn current_lr(&self) -> f64 {
        self.learning_rate.at(self.step_count)
    }
}

impl<P: fmt::Debug> fmt::Debug for TrainState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainState")
            .field("network", &self.network)
            .field("learning_rate", &self.learning_rate)
            .field("step_count", &self.step_count)
            .finish()
    }
}

/// PPO epochs over collected trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyUpdater {
    pub coefs: LossCoefficients,
    pub max_grad_norm: f64,
    pub minibatch_size: usize,
    pub num_minibatches: usize,
    pub update_epochs: usize,
}

impl PolicyUpdater {
    /// One gradient step on `minibatch`, global-norm clipped.
    pub fn minibatch_step<P: ActorCritic>(
        &self,
        state: &mut TrainState<P>,
        minibatch: &FlatBatch,
    ) -> Result<LossInfo> {
        let batch = TensorBatch::new(minibatch, state.network.device());
        let output = state.network.apply(&batch.obs)?;
        let loss = ppo_loss(&output, &batch, &self.coefs)?;
        let lr = state.current_lr();
        state.optimizer.set_lr(lr);
        state
            .optimizer
            .backward_step_clip_norm(&loss.total, self.max_grad_norm);
        state.step_count += 1;
        Ok(loss.info)
    }

    /// Shuffle, split, then one sequential step per minibatch.
    ///
    /// The batch size is checked before anything runs, so a mismatch leaves
    /// `state` untouched.
    pub fn run_epoch<P: ActorCritic>(
        &self,
        state: &mut TrainState<P>,
        batch: &FlatBatch,
        key: PrngKey,
    ) -> Result<Vec<LossInfo>> {
        check_batch_size(batch.len(), self.minibatch_size, self.num_minibatches)?;
        let minibatches = batch
            .shuffle(key)
            .split(self.minibatch_size, self.num_minibatches)?;

        let mut infos = Vec::with_capacity(minibatches.len());
        for minibatch in &minibatches {
            let info = self.minibatch_step(state, minibatch)?;
            trace!(
                step = state.step_count,
                total = info.total,
                approx_kl = info.approx_kl,
                "minibatch step"
            );
            infos.push(info);
        }
        Ok(infos)
    }

    /// `update_epochs` epochs over one trajectory, each with its own shuffle key.
    ///
    /// Returns the advanced key and the mean loss terms.
    pub fn update<P: ActorCritic>(
        &self,
        state: &mut TrainState<P>,
        trajectory: &Trajectory,
        gae: &GaeOutput,
        key: PrngKey,
    ) -> Result<(PrngKey, LossInfo)> {
        let batch = FlatBatch::from_trajectory(trajectory, gae)?;
        check_batch_size(batch.len(), self.minibatch_size, self.num_minibatches)?;

        let mut key = key;
        let mut infos = Vec::with_capacity(self.update_epochs * self.num_minibatches);
        for _ in 0..self.update_epochs {
            let (next_key, key_perm) = key.split();
            key = next_key;
            infos.extend(self.run_epoch(state, &batch, key_perm)?);
        }
        Ok((key, LossInfo::mean(&infos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array2;
    use crate::error::IppoError;
    use crate::policy::{MlpActorCritic, MlpSpec, NetworkSpec};

    const COEFS: LossCoefficients = LossCoefficients {
        clip_eps: 0.2,
        vf_coef: 0.5,
        ent_coef: 0.01,
    };

    fn updater(minibatch_size: usize, coefs: LossCoefficients) -> PolicyUpdater {
        PolicyUpdater {
            coefs,
            max_grad_norm: 0.5,
            minibatch_size,
            num_minibatches: 4,
            update_epochs: 1,
        }
    }

    fn batch(n: usize) -> FlatBatch {
        let obs: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i % 3) as f64, 1.0 - (i % 2) as f64])
            .collect();
        FlatBatch {
            obs: Array2::from_rows(&obs).unwrap(),
            actions: (0..n).map(|i| i % 2).collect(),
            values: vec![0.0; n],
            log_probs: vec![(0.5f64).ln(); n],
            advantages: (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect(),
            targets: (0..n).map(|i| (i % 3) as f64).collect(),
        }
    }

    fn state() -> TrainState<MlpActorCritic> {
        let net = MlpSpec::new(2, 8).build(2, PrngKey::new(0)).unwrap();
        TrainState::new(net, LearningRate::Constant(1e-2)).unwrap()
    }

    #[test]
    fn epoch_takes_one_step_per_minibatch() {
        let mut state = state();
        let before = state.network.flat_params().unwrap();
        let infos = updater(4, COEFS)
            .run_epoch(&mut state, &batch(16), PrngKey::new(1))
            .unwrap();
        assert_eq!(infos.len(), 4);
        assert_eq!(state.step_count, 4);
        assert_ne!(state.network.flat_params().unwrap(), before);
    }

    #[test]
    fn mismatched_batch_is_rejected_before_any_step() {
        let mut state = state();
        let before = state.network.flat_params().unwrap();
        let result = updater(5, COEFS).run_epoch(&mut state, &batch(16), PrngKey::new(1));
        assert_eq!(
            result.err(),
            Some(IppoError::BatchSizeMismatch {
                batch_size: 16,
                minibatch_size: 5,
                num_minibatches: 4,
            })
        );
        assert_eq!(state.step_count, 0);
        assert_eq!(state.network.flat_params().unwrap(), before);
    }

    #[test]
    fn epochs_are_reproducible_per_key() {
        let run = |key: u64| {
            let mut state = state();
            updater(4, COEFS)
                .run_epoch(&mut state, &batch(16), PrngKey::new(key))
                .unwrap();
            state.network.flat_params().unwrap()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn repeated_epochs_reduce_value_error() {
        // wide clip range: plain regression on the targets
        let coefs = LossCoefficients {
            clip_eps: 100.0,
            ..COEFS
        };
        let updater = updater(4, coefs);
        let data = batch(16);
        let mut state = state();
        let mut key = PrngKey::new(3);
        let mut first = Vec::new();
        let mut last = Vec::new();
        for epoch in 0..40 {
            let (next_key, k) = key.split();
            key = next_key;
            last = updater.run_epoch(&mut state, &data, k).unwrap();
            if epoch == 0 {
                first = last.clone();
            }
        }
        let mean = |infos: &[LossInfo]| LossInfo::mean(infos).value_loss;
        assert!(mean(&last) < mean(&first));
        assert_eq!(state.step_count, 160);
    }

    #[test]
    fn learning_rate_follows_step_count() {
        let mut state = state();
        state.learning_rate = LearningRate::Linear {
            base: 1.0,
            num_minibatches: 4,
            update_epochs: 1,
            num_updates: 2,
        };
        assert_eq!(state.current_lr(), 1.0);
        updater(4, COEFS)
            .run_epoch(&mut state, &batch(16), PrngKey::new(2))
            .unwrap();
        assert_eq!(state.current_lr(), 0.5);
    }
}
