//! Episode-return bookkeeping wrapper.

use super::{AgentMap, EnvStep, MultiAgentEnv, Space};
use crate::error::{IppoError, Result};
use crate::key::PrngKey;

/// Info key: return of each agent's most recently finished episode.
pub const RETURNED_EPISODE_RETURNS: &str = "returned_episode_returns";
/// Info key: length of each agent's most recently finished episode.
pub const RETURNED_EPISODE_LENGTHS: &str = "returned_episode_lengths";
/// Info key: `1.0` on the step an episode finished, else `0.0`.
pub const RETURNED_EPISODE: &str = "returned_episode";

/// Wrapped state plus running and last-completed episode statistics, per agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LogState<S> {
    pub env_state: S,
    pub episode_returns: Vec<f64>,
    pub episode_lengths: Vec<usize>,
    pub returned_episode_returns: Vec<f64>,
    pub returned_episode_lengths: Vec<usize>,
}

/// Tracks episode returns of an auto-resetting environment and reports them through `info`.
#[derive(Debug, Clone)]
pub struct LogWrapper<E> {
    env: E,
}

impl<E: MultiAgentEnv> LogWrapper<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }
}

impl<E: MultiAgentEnv> MultiAgentEnv for LogWrapper<E> {
    type State = LogState<E::State>;

    fn agents(&self) -> &[String] {
        self.env.agents()
    }

    fn observation_space(&self, agent: &str) -> Space {
        self.env.observation_space(agent)
    }

    fn action_space(&self, agent: &str) -> Space {
        self.env.action_space(agent)
    }

    fn reset(&self, key: PrngKey) -> (AgentMap<Vec<f64>>, Self::State) {
        let (obs, env_state) = self.env.reset(key);
        let n = self.env.num_agents();
        let state = LogState {
            env_state,
            episode_returns: vec![0.0; n],
            episode_lengths: vec![0; n],
            returned_episode_returns: vec![0.0; n],
            returned_episode_lengths: vec![0; n],
        };
        (obs, state)
    }

    /// Steps the inner environment, which resets itself at episode end.
    fn step_env(
        &self,
        key: PrngKey,
        state: &Self::State,
        actions: &AgentMap<usize>,
    ) -> Result<EnvStep<Self::State>> {
        let out = self.env.step(key, &state.env_state, actions)?;
        let ep_done = out.is_done_all();

        let mut next = LogState {
            env_state: out.state,
            episode_returns: Vec::with_capacity(state.episode_returns.len()),
            episode_lengths: Vec::with_capacity(state.episode_lengths.len()),
            returned_episode_returns: state.returned_episode_returns.clone(),
            returned_episode_lengths: state.returned_episode_lengths.clone(),
        };
        for (i, agent) in self.env.agents().iter().enumerate() {
            let reward = *out
                .rewards
                .get(agent)
                .ok_or_else(|| IppoError::MissingAgent(agent.clone()))?;
            let new_return = state.episode_returns[i] + reward;
            let new_length = state.episode_lengths[i] + 1;
            if ep_done {
                next.returned_episode_returns[i] = new_return;
                next.returned_episode_lengths[i] = new_length;
                next.episode_returns.push(0.0);
                next.episode_lengths.push(0);
            } else {
                next.episode_returns.push(new_return);
                next.episode_lengths.push(new_length);
            }
        }

        let n = self.env.num_agents();
        let mut info = out.info;
        info.insert(
            RETURNED_EPISODE_RETURNS.to_string(),
            next.returned_episode_returns.clone(),
        );
        info.insert(
            RETURNED_EPISODE_LENGTHS.to_string(),
            next.returned_episode_lengths
                .iter()
                .map(|&l| l as f64)
                .collect(),
        );
        info.insert(
            RETURNED_EPISODE.to_string(),
            vec![if ep_done { 1.0 } else { 0.0 }; n],
        );

        Ok(EnvStep {
            observations: out.observations,
            state: next,
            rewards: out.rewards,
            dones: out.dones,
            info,
        })
    }

    /// Same as [`MultiAgentEnv::step_env`]: the inner environment already
    /// auto-resets, and resetting here would wipe the returned statistics.
    fn step(
        &self,
        key: PrngKey,
        state: &Self::State,
        actions: &AgentMap<usize>,
    ) -> Result<EnvStep<Self::State>> {
        self.step_env(key, state, actions)
    }
}
