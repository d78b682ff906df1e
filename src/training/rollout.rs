//! Rollout collection over a vector of environment instances.

use tracing::debug;

use super::trajectory::{Trajectory, Transition};
use super::update::TrainState;
use crate::array::Array2;
use crate::batch::{batchify, split_env_scalars, stack_env_scalars, stack_envs, unbatchify};
use crate::env::{Info, MultiAgentEnv};
use crate::error::{IppoError, Result};
use crate::key::PrngKey;
use crate::policy::{to_tensor, to_vec, ActorCritic};

/// Everything carried from one rollout step to the next.
#[derive(Debug)]
pub struct RunnerState<S, P> {
    pub train_state: TrainState<P>,
    /// One state per environment instance.
    pub env_states: Vec<S>,
    /// Current observation per actor slot, `(num_actors, obs_dim)`.
    pub last_obs: Array2<f64>,
    pub key: PrngKey,
}

/// Steps `num_envs` instances of `env` in lockstep.
#[derive(Debug)]
pub struct RolloutCollector<'a, E> {
    env: &'a E,
    num_envs: usize,
}

impl<'a, E: MultiAgentEnv> RolloutCollector<'a, E> {
    pub fn new(env: &'a E, num_envs: usize) -> Self {
        Self { env, num_envs }
    }

    pub fn num_actors(&self) -> usize {
        self.env.num_agents() * self.num_envs
    }

    /// Resets every instance with its own key; returns batched observations and states.
    pub fn reset(&self, key: PrngKey) -> Result<(Array2<f64>, Vec<E::State>)> {
        let mut observations = Vec::with_capacity(self.num_envs);
        let mut states = Vec::with_capacity(self.num_envs);
        for k in key.split_n(self.num_envs) {
            let (obs, state) = self.env.reset(k);
            observations.push(obs);
            states.push(state);
        }
        let agents = self.env.agents();
        let obs = batchify(&stack_envs(&observations, agents)?, agents, self.num_actors())?;
        Ok((obs, states))
    }

    /// Runs `num_steps` steps under the runner's network, advancing `runner`
    /// and returning the recorded trajectory.
    pub fn collect<P: ActorCritic>(
        &self,
        runner: &mut RunnerState<E::State, P>,
        num_steps: usize,
    ) -> Result<Trajectory> {
        let mut trajectory = Trajectory::with_capacity(self.num_actors(), num_steps);
        for _ in 0..num_steps {
            let transition = self.step(runner)?;
            trajectory.push(transition)?;
        }
        debug!(
            steps = num_steps,
            actors = self.num_actors(),
            total_reward = trajectory.total_reward(),
            "rollout collected"
        );
        Ok(trajectory)
    }

    /// One synchronized step of every instance.
    ///
    /// `runner` is only written once every instance has stepped.
    pub fn step<P: ActorCritic>(&self, runner: &mut RunnerState<E::State, P>) -> Result<Transition> {
        let agents = self.env.agents();
        let num_agents = agents.len();
        let num_actors = self.num_actors();
        if runner.env_states.len() != self.num_envs {
            return Err(IppoError::shape(
                "RunnerState env_states",
                self.num_envs,
                runner.env_states.len(),
            ));
        }

        // Select actions
        let (key, key_act) = runner.key.split();
        let network = &runner.train_state.network;
        let obs = to_tensor(&runner.last_obs, network.device());
        let output = tch::no_grad(|| network.apply(&obs))?;
        let actions = output.dist.sample(key_act)?;
        let action_index: Vec<i64> = actions.iter().map(|&a| a as i64).collect();
        let log_prob = to_vec(&output.dist.log_prob(&tch::Tensor::from_slice(&action_index))?)?;
        let value = to_vec(&output.values)?;
        let env_actions = unbatchify(
            &Array2::column(actions.clone()),
            agents,
            self.num_envs,
            num_agents,
        )?;
        let per_env_actions = split_env_scalars(&env_actions, agents, self.num_envs)?;

        // Step environments
        let (key, key_step) = key.split();
        let mut env_states = Vec::with_capacity(self.num_envs);
        let mut observations = Vec::with_capacity(self.num_envs);
        let mut rewards = Vec::with_capacity(self.num_envs);
        let mut dones = Vec::with_capacity(self.num_envs);
        let mut infos = Vec::with_capacity(self.num_envs);
        for ((state, env_action), k) in runner
            .env_states
            .iter()
            .zip(&per_env_actions)
            .zip(key_step.split_n(self.num_envs))
        {
            let out = self.env.step(k, state, env_action)?;
            env_states.push(out.state);
            observations.push(out.observations);
            rewards.push(out.rewards);
            dones.push(out.dones);
            infos.push(out.info);
        }

        let next_obs = batchify(&stack_envs(&observations, agents)?, agents, num_actors)?;
        let reward = batchify(&stack_env_scalars(&rewards, agents)?, agents, num_actors)?;
        let done = batchify(&stack_env_scalars(&dones, agents)?, agents, num_actors)?;
        let info = info_to_actors(&infos, num_agents)?;

        runner.env_states = env_states;
        runner.key = key;
        Ok(Transition {
            done: done.into_vec(),
            action: actions,
            value,
            reward: reward.into_vec(),
            log_prob,
            obs: std::mem::replace(&mut runner.last_obs, next_obs),
            info,
        })
    }
}

/// Per-environment info (values in agent order) to actor-slot order.
fn info_to_actors(infos: &[Info], num_agents: usize) -> Result<Info> {
    let num_envs = infos.len();
    let Some(first) = infos.first() else {
        return Ok(Info::new());
    };
    let mut out = Info::new();
    for name in first.keys() {
        let mut values = vec![0.0; num_agents * num_envs];
        for (env, info) in infos.iter().enumerate() {
            let per_agent = info
                .get(name)
                .filter(|v| v.len() == num_agents)
                .ok_or_else(|| {
                    IppoError::shape(
                        "step info",
                        format!("{} values for '{}'", num_agents, name),
                        info.get(name).map_or(0, Vec::len),
                    )
                })?;
            for (agent, v) in per_agent.iter().enumerate() {
                values[agent * num_envs + env] = *v;
            }
        }
        out.insert(name.clone(), values);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::log_wrapper::RETURNED_EPISODE;
    use crate::env::{LogWrapper, SignalMatch};
    use crate::optim::LearningRate;
    use crate::policy::{MlpActorCritic, MlpSpec, NetworkSpec};

    type Env = LogWrapper<SignalMatch>;
    type Runner = RunnerState<<Env as MultiAgentEnv>::State, MlpActorCritic>;

    fn env() -> Env {
        LogWrapper::new(SignalMatch::new(2, 3, 4))
    }

    fn runner(env: &Env, num_envs: usize) -> Runner {
        let collector = RolloutCollector::new(env, num_envs);
        let (key, key_reset) = PrngKey::new(5).split();
        let (key, key_init) = key.split();
        let (last_obs, env_states) = collector.reset(key_reset).unwrap();
        let network = MlpSpec::new(3, 8).build(4, key_init).unwrap();
        RunnerState {
            train_state: TrainState::new(network, LearningRate::Constant(1e-3)).unwrap(),
            env_states,
            last_obs,
            key,
        }
    }

    #[test]
    fn reset_batches_agent_major() {
        let env = env();
        let collector = RolloutCollector::new(&env, 3);
        let runner = runner(&env, 3);
        assert_eq!(collector.num_actors(), 6);
        assert_eq!(runner.last_obs.shape(), (6, 4));
        assert_eq!(runner.env_states.len(), 3);
        // both agents of an env see the same step counter
        for e in 0..3 {
            assert_eq!(runner.last_obs[(e, 3)], runner.last_obs[(3 + e, 3)]);
        }
    }

    #[test]
    fn collect_produces_horizon_steps() {
        let env = env();
        let collector = RolloutCollector::new(&env, 3);
        let mut runner = runner(&env, 3);
        let first_obs = runner.last_obs.clone();
        let traj = collector.collect(&mut runner, 5).unwrap();
        assert_eq!(traj.len(), 5);
        assert_eq!(traj.num_actors(), 6);
        assert_eq!(traj.steps()[0].obs, first_obs);
        assert_eq!(runner.last_obs.shape(), (6, 4));
        // episodes last 4 steps, so every instance finished once
        assert!(traj.steps()[3].done.iter().all(|d| *d));
        assert!(traj.steps()[3].info[RETURNED_EPISODE].iter().all(|f| *f == 1.0));
        assert!(traj.steps()[4].done.iter().all(|d| !*d));
    }

    #[test]
    fn recorded_obs_is_pre_step() {
        let env = env();
        let collector = RolloutCollector::new(&env, 2);
        let mut runner = runner(&env, 2);
        let traj = collector.collect(&mut runner, 3).unwrap();
        for (t, step) in traj.iter().enumerate() {
            for a in 0..4 {
                assert_eq!(step.obs[(a, 3)], t as f64 / 4.0);
            }
        }
    }

    #[test]
    fn rewards_follow_actions() {
        let env = env();
        let collector = RolloutCollector::new(&env, 2);
        let mut runner = runner(&env, 2);
        let traj = collector.collect(&mut runner, 4).unwrap();
        for step in &traj {
            for a in 0..4 {
                let target = (0..3).find(|&s| step.obs[(a, s)] == 1.0).unwrap();
                let expected = if step.action[a] == target { 1.0 } else { 0.0 };
                assert_eq!(step.reward[a], expected);
                assert!(step.log_prob[a] < 0.0);
            }
        }
    }

    #[test]
    fn collection_is_reproducible() {
        let env = env();
        let collector = RolloutCollector::new(&env, 2);
        let mut ra = runner(&env, 2);
        let mut rb = runner(&env, 2);
        let a = collector.collect(&mut ra, 6).unwrap();
        let b = collector.collect(&mut rb, 6).unwrap();
        assert_eq!(a, b);
        assert_eq!(ra.last_obs, rb.last_obs);
        assert_eq!(ra.env_states, rb.env_states);
        assert_eq!(ra.key, rb.key);
    }

    #[test]
    fn wrong_env_count_is_rejected() {
        let env = env();
        let collector = RolloutCollector::new(&env, 3);
        let mut runner = runner(&env, 2);
        let key = runner.key;
        assert!(collector.collect(&mut runner, 1).is_err());
        assert_eq!(runner.key, key);
    }

    #[test]
    fn info_is_laid_out_by_actor_slot() {
        let infos: Vec<Info> = (0..2)
            .map(|e| {
                let mut info = Info::new();
                info.insert("x".to_string(), vec![10.0 + e as f64, 20.0 + e as f64]);
                info
            })
            .collect();
        let out = info_to_actors(&infos, 2).unwrap();
        assert_eq!(out["x"], vec![10.0, 11.0, 20.0, 21.0]);
    }
}
