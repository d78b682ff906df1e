//! Batched categorical distribution over discrete actions.

use rand::distributions::{Distribution, WeightedIndex};
use tch::{Kind, Tensor};

use super::to_vec;
use crate::error::{IppoError, Result};
use crate::key::PrngKey;

/// One categorical distribution per row of a `(batch, num_actions)` logits tensor.
///
/// Stays attached to the graph of the logits, so `log_prob` and `entropy`
/// can be differentiated.
#[derive(Debug)]
pub struct Categorical {
    log_probs: Tensor,
}

impl Categorical {
    /// Builds the distribution from unnormalized log-probabilities.
    pub fn new(logits: &Tensor) -> Self {
        Self {
            log_probs: logits.log_softmax(-1, Kind::Double),
        }
    }

    /// Number of distributions in the batch.
    pub fn len(&self) -> usize {
        self.log_probs.size().first().map_or(0, |&n| n as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_actions(&self) -> usize {
        self.log_probs.size().last().map_or(0, |&n| n as usize)
    }

    /// Normalized log-probabilities, `(batch, num_actions)`.
    pub fn log_probs(&self) -> &Tensor {
        &self.log_probs
    }

    pub fn probs(&self) -> Tensor {
        self.log_probs.exp()
    }

    /// Draws one action per row.
    pub fn sample(&self, key: PrngKey) -> Result<Vec<usize>> {
        let n = self.num_actions();
        if n == 0 {
            return Err(IppoError::Backend(
                "cannot sample from a distribution without actions".to_string(),
            ));
        }
        let probs = to_vec(&self.probs())?;
        let mut rng = key.rng();
        probs
            .chunks(n)
            .map(|row| {
                WeightedIndex::new(row)
                    .map(|d| d.sample(&mut rng))
                    .map_err(|e| IppoError::Backend(format!("invalid action probabilities: {}", e)))
            })
            .collect()
    }

    /// Log-probability of `actions[i]` under row `i`; `actions` is an int64 `(batch,)` tensor.
    pub fn log_prob(&self, actions: &Tensor) -> Result<Tensor> {
        if actions.size() != [self.len() as i64] {
            return Err(IppoError::shape(
                "Categorical::log_prob",
                format!("[{}]", self.len()),
                format!("{:?}", actions.size()),
            ));
        }
        Ok(self
            .log_probs
            .f_gather(-1, &actions.unsqueeze(-1), false)?
            .squeeze_dim(-1))
    }

    /// Shannon entropy per row, `(batch,)`.
    ///
    /// Zero-probability actions (logit `-inf`) contribute nothing, to the
    /// value and to its gradient.
    pub fn entropy(&self) -> Tensor {
        let support = self.log_probs.isfinite();
        let log_probs = self
            .log_probs
            .where_self(&support, &self.log_probs.zeros_like());
        -(self.probs() * log_probs).sum_dim_intlist([-1].as_slice(), false, Kind::Double)
    }
}
