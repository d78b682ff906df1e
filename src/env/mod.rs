//! Multi-agent environment interface.
//!
//! Environments are functional: `reset` and `step` take a key and the
//! previous state by reference and return a new state, so a batch of
//! instances can be carried by value through the rollout loop.

pub mod log_wrapper;
pub mod signal_match;

use std::collections::BTreeMap;

use rand::Rng;

use crate::error::Result;
use crate::key::PrngKey;

pub use crate::batch::{AgentMap, DONE_ALL};
pub use log_wrapper::{LogState, LogWrapper};
pub use signal_match::{SignalMatch, SignalMatchState};

/// Auxiliary per-step data. Each entry holds one value per agent, in agent-list order.
pub type Info = BTreeMap<String, Vec<f64>>;

/// Shape of an agent's action or observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    /// Integer actions `0..n`.
    Discrete(usize),
    /// Real vector bounded elementwise by `[low, high]`.
    Box {
        low: f64,
        high: f64,
        shape: Vec<usize>,
    },
}

/// A draw from a [`Space`].
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceSample {
    Discrete(usize),
    Box(Vec<f64>),
}

impl Space {
    /// Number of scalars in one flattened element.
    pub fn flat_dim(&self) -> usize {
        match self {
            Space::Discrete(_) => 1,
            Space::Box { shape, .. } => shape.iter().product(),
        }
    }

    /// Number of discrete choices, if discrete.
    pub fn num_actions(&self) -> Option<usize> {
        match self {
            Space::Discrete(n) => Some(*n),
            Space::Box { .. } => None,
        }
    }

    /// Uniform sample.
    pub fn sample(&self, key: PrngKey) -> SpaceSample {
        let mut rng = key.rng();
        match self {
            Space::Discrete(n) => SpaceSample::Discrete(rng.gen_range(0..*n)),
            Space::Box { low, high, .. } => SpaceSample::Box(
                (0..self.flat_dim())
                    .map(|_| rng.gen_range(*low..=*high))
                    .collect(),
            ),
        }
    }
}

/// Result of stepping one environment instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep<S> {
    pub observations: AgentMap<Vec<f64>>,
    pub state: S,
    pub rewards: AgentMap<f64>,
    /// Per-agent done flags plus the [`DONE_ALL`] sentinel.
    pub dones: AgentMap<bool>,
    pub info: Info,
}

impl<S> EnvStep<S> {
    /// Whether the episode ended for every agent.
    pub fn is_done_all(&self) -> bool {
        self.dones.get(DONE_ALL).copied().unwrap_or(false)
    }
}

/// A multi-agent environment with a fixed, ordered agent list.
pub trait MultiAgentEnv {
    type State: Clone + std::fmt::Debug;

    /// Agent identifiers; actor slot `i` within an instance is `agents()[i]`.
    fn agents(&self) -> &[String];

    fn num_agents(&self) -> usize {
        self.agents().len()
    }

    fn observation_space(&self, agent: &str) -> Space;

    fn action_space(&self, agent: &str) -> Space;

    /// Starts a new episode.
    fn reset(&self, key: PrngKey) -> (AgentMap<Vec<f64>>, Self::State);

    /// Raw transition, without auto-reset.
    fn step_env(
        &self,
        key: PrngKey,
        state: &Self::State,
        actions: &AgentMap<usize>,
    ) -> Result<EnvStep<Self::State>>;

    /// Transition with auto-reset.
    ///
    /// When the episode ends the returned observations and state come from a
    /// fresh [`MultiAgentEnv::reset`], while rewards, dones and info still
    /// describe the terminal step.
    fn step(
        &self,
        key: PrngKey,
        state: &Self::State,
        actions: &AgentMap<usize>,
    ) -> Result<EnvStep<Self::State>> {
        let (key_step, key_reset) = key.split();
        let out = self.step_env(key_step, state, actions)?;
        if out.is_done_all() {
            let (observations, state) = self.reset(key_reset);
            return Ok(EnvStep {
                observations,
                state,
                ..out
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_sample_in_range() {
        let space = Space::Discrete(5);
        for k in PrngKey::new(0).split_n(50) {
            match space.sample(k) {
                SpaceSample::Discrete(a) => assert!(a < 5),
                other => panic!("unexpected sample {:?}", other),
            }
        }
    }

    #[test]
    fn box_sample_respects_bounds_and_shape() {
        let space = Space::Box {
            low: -1.0,
            high: 2.0,
            shape: vec![2, 3],
        };
        assert_eq!(space.flat_dim(), 6);
        match space.sample(PrngKey::new(9)) {
            SpaceSample::Box(v) => {
                assert_eq!(v.len(), 6);
                assert!(v.iter().all(|x| (-1.0..=2.0).contains(x)));
            }
            other => panic!("unexpected sample {:?}", other),
        }
    }

    #[test]
    fn sample_is_reproducible() {
        let space = Space::Discrete(100);
        let k = PrngKey::new(4);
        assert_eq!(space.sample(k), space.sample(k));
    }

    #[test]
    fn step_auto_resets_on_episode_end() {
        let env = SignalMatch::new(1, 2, 1);
        let (_, state) = env.reset(PrngKey::new(0));
        let actions: AgentMap<usize> = [("agent_0".to_string(), 0)].into_iter().collect();
        let out = env.step(PrngKey::new(1), &state, &actions).unwrap();
        assert!(out.is_done_all());
        assert_eq!(out.state.t, 0);
    }
}
