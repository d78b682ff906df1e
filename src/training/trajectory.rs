//! Rollout storage: one batched transition per timestep.

use crate::array::Array2;
use crate::env::Info;
use crate::error::{IppoError, Result};

/// Everything recorded for one timestep, indexed by actor slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Episode ended on this step.
    pub done: Vec<bool>,
    /// Action taken.
    pub action: Vec<usize>,
    /// Value estimate of the pre-step observation.
    pub value: Vec<f64>,
    /// Reward received.
    pub reward: Vec<f64>,
    /// Log-probability of `action` under the acting policy.
    pub log_prob: Vec<f64>,
    /// Pre-step observation, `(num_actors, obs_dim)`.
    pub obs: Array2<f64>,
    /// Auxiliary environment data, one value per actor slot per key.
    pub info: Info,
}

impl Transition {
    pub fn num_actors(&self) -> usize {
        self.action.len()
    }

    fn check(&self, num_actors: usize) -> Result<()> {
        let lengths = [
            self.done.len(),
            self.action.len(),
            self.value.len(),
            self.reward.len(),
            self.log_prob.len(),
            self.obs.rows(),
        ];
        if lengths.iter().any(|&l| l != num_actors) {
            return Err(IppoError::shape(
                "Transition",
                format!("{} actors in every field", num_actors),
                format!("{:?}", lengths),
            ));
        }
        if let Some((k, v)) = self.info.iter().find(|(_, v)| v.len() != num_actors) {
            return Err(IppoError::shape(
                "Transition info",
                format!("{} values for '{}'", num_actors, k),
                v.len(),
            ));
        }
        Ok(())
    }
}

/// Time-ordered transitions with a fixed number of actor slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    steps: Vec<Transition>,
    num_actors: usize,
}

impl Trajectory {
    pub fn new(num_actors: usize) -> Self {
        Self {
            steps: Vec::new(),
            num_actors,
        }
    }

    pub fn with_capacity(num_actors: usize, horizon: usize) -> Self {
        Self {
            steps: Vec::with_capacity(horizon),
            num_actors,
        }
    }

    /// Appends the next timestep.
    pub fn push(&mut self, transition: Transition) -> Result<()> {
        transition.check(self.num_actors)?;
        if let Some(first) = self.steps.first() {
            if first.obs.cols() != transition.obs.cols() {
                return Err(IppoError::shape(
                    "Trajectory obs width",
                    first.obs.cols(),
                    transition.obs.cols(),
                ));
            }
        }
        self.steps.push(transition);
        Ok(())
    }

    /// Horizon length.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn num_actors(&self) -> usize {
        self.num_actors
    }

    pub fn obs_dim(&self) -> usize {
        self.steps.first().map_or(0, |t| t.obs.cols())
    }

    pub fn steps(&self) -> &[Transition] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transition> {
        self.steps.iter()
    }

    /// Sum of rewards over all steps and actors.
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().flat_map(|t| t.reward.iter()).sum()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Transition;
    type IntoIter = std::slice::Iter<'a, Transition>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
pub(crate) fn transition(
    reward: Vec<f64>,
    value: Vec<f64>,
    done: Vec<bool>,
) -> Transition {
    let n = reward.len();
    Transition {
        done,
        action: vec![0; n],
        value,
        reward,
        log_prob: vec![0.0; n],
        obs: Array2::filled(n, 1, 0.0),
        info: Info::new(),
    }
}
