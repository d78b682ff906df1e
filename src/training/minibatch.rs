//! Flattening, shuffling and partitioning of a trajectory batch.

use rand::seq::SliceRandom;

use super::gae::GaeOutput;
use super::trajectory::Trajectory;
use crate::array::Array2;
use crate::error::{IppoError, Result};
use crate::key::PrngKey;

/// A trajectory flattened over `(time, actor)`, with its advantages and targets.
///
/// Row `t * num_actors + a` holds timestep `t` of actor slot `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBatch {
    pub obs: Array2<f64>,
    pub actions: Vec<usize>,
    pub values: Vec<f64>,
    pub log_probs: Vec<f64>,
    pub advantages: Vec<f64>,
    pub targets: Vec<f64>,
}

impl FlatBatch {
    /// Flattens `trajectory` and its GAE output into one batch.
    pub fn from_trajectory(trajectory: &Trajectory, gae: &GaeOutput) -> Result<Self> {
        if gae.advantages.len() != trajectory.len() || gae.targets.len() != trajectory.len() {
            return Err(IppoError::shape(
                "FlatBatch advantages",
                trajectory.len(),
                gae.advantages.len(),
            ));
        }
        let n = trajectory.len() * trajectory.num_actors();
        let mut obs_parts = Vec::with_capacity(trajectory.len());
        let mut batch = FlatBatch {
            obs: Array2::filled(0, trajectory.obs_dim(), 0.0),
            actions: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
            log_probs: Vec::with_capacity(n),
            advantages: Vec::with_capacity(n),
            targets: Vec::with_capacity(n),
        };
        for ((step, adv), tgt) in trajectory.iter().zip(&gae.advantages).zip(&gae.targets) {
            if adv.len() != trajectory.num_actors() || tgt.len() != trajectory.num_actors() {
                return Err(IppoError::shape(
                    "FlatBatch advantages",
                    trajectory.num_actors(),
                    adv.len(),
                ));
            }
            obs_parts.push(step.obs.clone());
            batch.actions.extend_from_slice(&step.action);
            batch.values.extend_from_slice(&step.value);
            batch.log_probs.extend_from_slice(&step.log_prob);
            batch.advantages.extend_from_slice(adv);
            batch.targets.extend_from_slice(tgt);
        }
        if !obs_parts.is_empty() {
            batch.obs = Array2::concat_rows(&obs_parts)?;
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Rows `indices`, in order, across every field.
    pub fn gather(&self, indices: &[usize]) -> Self {
        let pick = |v: &[f64]| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        FlatBatch {
            obs: self.obs.gather_rows(indices),
            actions: indices.iter().map(|&i| self.actions[i]).collect(),
            values: pick(&self.values),
            log_probs: pick(&self.log_probs),
            advantages: pick(&self.advantages),
            targets: pick(&self.targets),
        }
    }

    /// Applies one random permutation to every field in lockstep.
    pub fn shuffle(&self, key: PrngKey) -> Self {
        self.gather(&permutation(key, self.len()))
    }

    /// Contiguous rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        FlatBatch {
            obs: self.obs.slice_rows(start, end),
            actions: self.actions[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            log_probs: self.log_probs[start..end].to_vec(),
            advantages: self.advantages[start..end].to_vec(),
            targets: self.targets[start..end].to_vec(),
        }
    }

    /// Splits into `num_minibatches` contiguous chunks of `minibatch_size`.
    pub fn split(&self, minibatch_size: usize, num_minibatches: usize) -> Result<Vec<FlatBatch>> {
        check_batch_size(self.len(), minibatch_size, num_minibatches)?;
        Ok((0..num_minibatches)
            .map(|k| self.slice(k * minibatch_size, (k + 1) * minibatch_size))
            .collect())
    }
}

/// Uniform random permutation of `0..n`.
pub fn permutation(key: PrngKey, n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut key.rng());
    indices
}

/// Fails unless `batch_size == minibatch_size * num_minibatches`.
pub fn check_batch_size(
    batch_size: usize,
    minibatch_size: usize,
    num_minibatches: usize,
) -> Result<()> {
    if minibatch_size == 0 || minibatch_size * num_minibatches != batch_size {
        return Err(IppoError::BatchSizeMismatch {
            batch_size,
            minibatch_size,
            num_minibatches,
        });
    }
    Ok(())
}
