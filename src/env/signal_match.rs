//! Signal matching game.
//!
//! Every agent privately observes a target signal and is rewarded for
//! naming it. Targets are redrawn each step and episodes have a fixed
//! length, so the optimal per-agent episode return equals `max_steps`.

use rand::Rng;

use super::{AgentMap, EnvStep, Info, MultiAgentEnv, Space, DONE_ALL};
use crate::error::{IppoError, Result};
use crate::key::PrngKey;

/// Episode state of [`SignalMatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMatchState {
    /// Current target per agent, in agent order.
    pub targets: Vec<usize>,
    /// Steps taken in this episode.
    pub t: usize,
}

/// Cooperative toy environment with discrete actions.
///
/// Observation per agent: `one_hot(target) ++ [t / max_steps]`.
#[derive(Debug, Clone)]
pub struct SignalMatch {
    agents: Vec<String>,
    num_signals: usize,
    max_steps: usize,
}

impl SignalMatch {
    /// Creates a game with `num_agents` agents named `agent_0..`.
    pub fn new(num_agents: usize, num_signals: usize, max_steps: usize) -> Self {
        Self {
            agents: (0..num_agents).map(|i| format!("agent_{}", i)).collect(),
            num_signals,
            max_steps,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn num_signals(&self) -> usize {
        self.num_signals
    }

    fn draw_targets(&self, key: PrngKey) -> Vec<usize> {
        let mut rng = key.rng();
        (0..self.agents.len())
            .map(|_| rng.gen_range(0..self.num_signals))
            .collect()
    }

    fn observe(&self, state: &SignalMatchState) -> AgentMap<Vec<f64>> {
        let progress = state.t as f64 / self.max_steps as f64;
        self.agents
            .iter()
            .zip(&state.targets)
            .map(|(agent, &target)| {
                let mut obs = vec![0.0; self.num_signals + 1];
                obs[target] = 1.0;
                obs[self.num_signals] = progress;
                (agent.clone(), obs)
            })
            .collect()
    }
}

impl MultiAgentEnv for SignalMatch {
    type State = SignalMatchState;

    fn agents(&self) -> &[String] {
        &self.agents
    }

    fn observation_space(&self, _agent: &str) -> Space {
        Space::Box {
            low: 0.0,
            high: 1.0,
            shape: vec![self.num_signals + 1],
        }
    }

    fn action_space(&self, _agent: &str) -> Space {
        Space::Discrete(self.num_signals)
    }

    fn reset(&self, key: PrngKey) -> (AgentMap<Vec<f64>>, SignalMatchState) {
        let state = SignalMatchState {
            targets: self.draw_targets(key),
            t: 0,
        };
        (self.observe(&state), state)
    }

    fn step_env(
        &self,
        key: PrngKey,
        state: &SignalMatchState,
        actions: &AgentMap<usize>,
    ) -> Result<EnvStep<SignalMatchState>> {
        let mut rewards = AgentMap::with_capacity(self.agents.len());
        for (agent, &target) in self.agents.iter().zip(&state.targets) {
            let action = *actions
                .get(agent)
                .ok_or_else(|| IppoError::MissingAgent(agent.clone()))?;
            if action >= self.num_signals {
                return Err(IppoError::shape(
                    "SignalMatch::step_env",
                    format!("action < {}", self.num_signals),
                    action,
                ));
            }
            rewards.insert(agent.clone(), if action == target { 1.0 } else { 0.0 });
        }

        let next = SignalMatchState {
            targets: self.draw_targets(key),
            t: state.t + 1,
        };
        let done = next.t >= self.max_steps;
        let mut dones: AgentMap<bool> = self.agents.iter().map(|a| (a.clone(), done)).collect();
        dones.insert(DONE_ALL.to_string(), done);

        Ok(EnvStep {
            observations: self.observe(&next),
            state: next,
            rewards,
            dones,
            info: Info::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(env: &SignalMatch, actions: &[usize]) -> AgentMap<usize> {
        env.agents().iter().cloned().zip(actions.iter().copied()).collect()
    }

    #[test]
    fn observation_encodes_target() {
        let env = SignalMatch::new(2, 3, 4);
        let (obs, state) = env.reset(PrngKey::new(5));
        for (agent, &target) in env.agents().iter().zip(&state.targets) {
            let o = &obs[agent];
            assert_eq!(o.len(), 4);
            assert_eq!(o[target], 1.0);
            assert_eq!(o.iter().take(3).sum::<f64>(), 1.0);
            assert_eq!(o[3], 0.0);
        }
    }

    #[test]
    fn matching_action_is_rewarded() {
        let env = SignalMatch::new(2, 3, 4);
        let (_, state) = env.reset(PrngKey::new(1));
        let wrong = (state.targets[1] + 1) % 3;
        let out = env
            .step_env(PrngKey::new(2), &state, &act(&env, &[state.targets[0], wrong]))
            .unwrap();
        assert_eq!(out.rewards["agent_0"], 1.0);
        assert_eq!(out.rewards["agent_1"], 0.0);
        assert!(!out.is_done_all());
        assert_eq!(out.state.t, 1);
    }

    #[test]
    fn episode_ends_after_max_steps() {
        let env = SignalMatch::new(1, 2, 3);
        let (_, mut state) = env.reset(PrngKey::new(0));
        let mut done = false;
        for (i, k) in PrngKey::new(1).split_n(3).into_iter().enumerate() {
            let out = env.step_env(k, &state, &act(&env, &[0])).unwrap();
            done = out.is_done_all();
            assert_eq!(done, i == 2);
            assert_eq!(out.dones["agent_0"], done);
            state = out.state;
        }
        assert!(done);
    }

    #[test]
    fn missing_action_is_an_error() {
        let env = SignalMatch::new(2, 2, 2);
        let (_, state) = env.reset(PrngKey::new(0));
        let partial = act(&env, &[0]);
        assert_eq!(
            env.step_env(PrngKey::new(1), &state, &partial),
            Err(IppoError::MissingAgent("agent_1".to_string()))
        );
    }

    #[test]
    fn out_of_range_action_is_an_error() {
        let env = SignalMatch::new(1, 2, 2);
        let (_, state) = env.reset(PrngKey::new(0));
        assert!(env
            .step_env(PrngKey::new(1), &state, &act(&env, &[7]))
            .is_err());
    }
}
