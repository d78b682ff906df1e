//! IPPO training loop: collect, estimate advantages, update, repeat.
//!
//! Every agent acts through the same network on its own observation, and
//! every actor slot contributes its own transitions to the PPO batch.

use rayon::prelude::*;
use tracing::{debug, info};

use super::gae::calculate_gae;
use super::loss::LossCoefficients;
use super::metrics::UpdateMetrics;
use super::rollout::{RolloutCollector, RunnerState};
use super::update::{PolicyUpdater, TrainState};
use crate::config::IppoConfig;
use crate::env::MultiAgentEnv;
use crate::error::{IppoError, Result};
use crate::key::PrngKey;
use crate::policy::{to_tensor, to_vec, ActorCritic, NetworkSpec};

/// Where the training loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Collecting,
    Estimating,
    Updating,
    Done,
}

impl Phase {
    /// Successor phase, given how many updates have completed.
    pub fn next(self, updates_done: usize, num_updates: usize) -> Phase {
        match self {
            Phase::Init if num_updates == 0 => Phase::Done,
            Phase::Init => Phase::Collecting,
            Phase::Collecting => Phase::Estimating,
            Phase::Estimating => Phase::Updating,
            Phase::Updating if updates_done >= num_updates => Phase::Done,
            Phase::Updating => Phase::Collecting,
            Phase::Done => Phase::Done,
        }
    }
}

/// Final runner state and per-update statistics of one training run.
#[derive(Debug)]
pub struct TrainOutput<S, P> {
    pub runner_state: RunnerState<S, P>,
    pub metrics: Vec<UpdateMetrics>,
    pub phase: Phase,
}

/// IPPO trainer over an environment and a shared actor-critic architecture.
#[derive(Debug, Clone)]
pub struct IppoTrainer<E, N> {
    env: E,
    spec: N,
    config: IppoConfig,
}

type Runner<E, N> = RunnerState<<E as MultiAgentEnv>::State, <N as NetworkSpec>::Network>;

impl<E, N> IppoTrainer<E, N>
where
    E: MultiAgentEnv,
    N: NetworkSpec,
{
    /// Validates `config` against the environment and the network's action count.
    pub fn new(env: E, spec: N, config: IppoConfig) -> Result<Self> {
        config.validate(env.num_agents())?;
        check_spaces(&env, spec.num_actions())?;
        Ok(Self { env, spec, config })
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn spec(&self) -> &N {
        &self.spec
    }

    pub fn config(&self) -> &IppoConfig {
        &self.config
    }

    fn num_agents(&self) -> usize {
        self.env.num_agents()
    }

    fn obs_dim(&self) -> usize {
        self.env
            .agents()
            .first()
            .map_or(0, |agent| self.env.observation_space(agent).flat_dim())
    }

    fn collector(&self) -> RolloutCollector<'_, E> {
        RolloutCollector::new(&self.env, self.config.num_envs)
    }

    fn updater(&self) -> PolicyUpdater {
        PolicyUpdater {
            coefs: LossCoefficients {
                clip_eps: self.config.clip_eps,
                vf_coef: self.config.vf_coef,
                ent_coef: self.config.ent_coef,
            },
            max_grad_norm: self.config.max_grad_norm,
            minibatch_size: self.config.minibatch_size(self.num_agents()),
            num_minibatches: self.config.num_minibatches,
            update_epochs: self.config.update_epochs,
        }
    }

    /// Fresh network and optimizer plus freshly reset environments.
    pub fn init(&self, key: PrngKey) -> Result<Runner<E, N>> {
        let (key, key_reset) = key.split();
        let (key, key_init) = key.split();

        let network = self.spec.build(self.obs_dim(), key_init)?;
        let (last_obs, env_states) = self.collector().reset(key_reset)?;
        let train_state = TrainState::new(network, self.config.learning_rate())?;

        debug!(
            num_params = train_state.network.flat_params()?.len(),
            num_actors = self.config.num_actors(self.num_agents()),
            "runner initialized"
        );
        Ok(RunnerState {
            train_state,
            env_states,
            last_obs,
            key,
        })
    }

    /// One collect/estimate/update iteration, advancing `runner` in place.
    pub fn run_update(&self, runner: &mut Runner<E, N>, update: usize) -> Result<UpdateMetrics> {
        let learning_rate = runner.train_state.current_lr();

        let mut phase = Phase::Collecting;
        debug!(update, ?phase, "entering phase");
        let trajectory = self.collector().collect(runner, self.config.num_steps)?;

        phase = phase.next(update, self.config.num_updates());
        debug!(update, ?phase, "entering phase");
        let network = &runner.train_state.network;
        let obs = to_tensor(&runner.last_obs, network.device());
        let last_values = to_vec(&tch::no_grad(|| network.apply(&obs))?.values)?;
        let gae = calculate_gae(
            &trajectory,
            &last_values,
            self.config.gamma,
            self.config.gae_lambda,
        )?;

        phase = phase.next(update, self.config.num_updates());
        debug!(update, ?phase, "entering phase");
        let (key, loss) =
            self.updater()
                .update(&mut runner.train_state, &trajectory, &gae, runner.key)?;
        runner.key = key;

        let metrics = UpdateMetrics::new(update, learning_rate, &loss, &trajectory);
        info!(
            update,
            lr = metrics.learning_rate,
            loss = metrics.total_loss,
            value_loss = metrics.value_loss,
            entropy = metrics.entropy,
            mean_return = metrics.mean_episode_return,
            "update complete"
        );
        Ok(metrics)
    }

    /// Full training run from `key`.
    pub fn train_with_key(&self, key: PrngKey) -> Result<TrainOutput<E::State, N::Network>> {
        let num_updates = self.config.num_updates();
        info!(
            num_updates,
            num_envs = self.config.num_envs,
            num_agents = self.num_agents(),
            "starting IPPO training"
        );
        let mut runner = self.init(key)?;
        let mut metrics = Vec::with_capacity(num_updates);
        let mut phase = Phase::Init.next(0, num_updates);
        while phase != Phase::Done {
            metrics.push(self.run_update(&mut runner, metrics.len())?);
            phase = Phase::Updating.next(metrics.len(), num_updates);
        }
        info!(updates = metrics.len(), "training finished");
        Ok(TrainOutput {
            runner_state: runner,
            metrics,
            phase,
        })
    }

    /// Full training run seeded by `config.seed`.
    pub fn train(&self) -> Result<TrainOutput<E::State, N::Network>> {
        self.train_with_key(PrngKey::new(self.config.seed))
    }

    /// `config.num_seeds` independent runs, one per key split from `config.seed`.
    ///
    /// Each run builds its own network and executes on the rayon thread pool;
    /// output order follows the key order.
    pub fn train_seeds(&self) -> Result<Vec<TrainOutput<E::State, N::Network>>>
    where
        E: Sync,
        E::State: Send,
    {
        PrngKey::new(self.config.seed)
            .split_n(self.config.num_seeds)
            .into_par_iter()
            .map(|key| self.train_with_key(key))
            .collect()
    }
}

/// Every agent must act in a discrete space of `num_actions` actions and
/// share one observation width.
fn check_spaces<E: MultiAgentEnv>(env: &E, num_actions: usize) -> Result<()> {
    let agents = env.agents();
    let Some(first) = agents.first() else {
        return Err(IppoError::InvalidConfig("environment has no agents".to_string()));
    };
    let obs_dim = env.observation_space(first).flat_dim();
    for agent in agents {
        let space = env.action_space(agent);
        if space.num_actions() != Some(num_actions) {
            return Err(IppoError::InvalidConfig(format!(
                "agent {} has action space {:?}, network expects Discrete({})",
                agent, space, num_actions
            )));
        }
        let dim = env.observation_space(agent).flat_dim();
        if dim != obs_dim {
            return Err(IppoError::InvalidConfig(format!(
                "agent {} observes {} values, {} observes {}",
                agent, dim, first, obs_dim
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{LogWrapper, SignalMatch};
    use crate::policy::{MlpActorCritic, MlpSpec};

    type Env = LogWrapper<SignalMatch>;

    fn small_config() -> IppoConfig {
        IppoConfig {
            num_envs: 2,
            num_steps: 8,
            total_timesteps: 2 * 8 * 3,
            num_minibatches: 4,
            update_epochs: 2,
            lr: 1e-3,
            seed: 11,
            ..IppoConfig::default()
        }
    }

    fn trainer(config: IppoConfig) -> Result<IppoTrainer<Env, MlpSpec>> {
        IppoTrainer::new(
            LogWrapper::new(SignalMatch::new(2, 3, 4)),
            MlpSpec::new(3, 16),
            config,
        )
    }

    fn assert_same_runner(
        a: &RunnerState<<Env as MultiAgentEnv>::State, MlpActorCritic>,
        b: &RunnerState<<Env as MultiAgentEnv>::State, MlpActorCritic>,
    ) {
        assert_eq!(
            a.train_state.network.flat_params().unwrap(),
            b.train_state.network.flat_params().unwrap()
        );
        assert_eq!(a.train_state.step_count, b.train_state.step_count);
        assert_eq!(a.env_states, b.env_states);
        assert_eq!(a.last_obs, b.last_obs);
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn phase_cycle() {
        assert_eq!(Phase::Init.next(0, 0), Phase::Done);
        assert_eq!(Phase::Init.next(0, 2), Phase::Collecting);
        assert_eq!(Phase::Collecting.next(0, 2), Phase::Estimating);
        assert_eq!(Phase::Estimating.next(0, 2), Phase::Updating);
        assert_eq!(Phase::Updating.next(1, 2), Phase::Collecting);
        assert_eq!(Phase::Updating.next(2, 2), Phase::Done);
        assert_eq!(Phase::Done.next(5, 2), Phase::Done);
    }

    #[test]
    fn init_resets_from_first_split_and_builds_from_second() {
        let t = trainer(small_config()).unwrap();
        let key = PrngKey::new(9);
        let runner = t.init(key).unwrap();

        let (key, key_reset) = key.split();
        let (key, key_init) = key.split();
        let (obs, states) = t.collector().reset(key_reset).unwrap();
        let network = MlpSpec::new(3, 16).build(4, key_init).unwrap();
        assert_eq!(runner.last_obs, obs);
        assert_eq!(runner.env_states, states);
        assert_eq!(
            runner.train_state.network.flat_params().unwrap(),
            network.flat_params().unwrap()
        );
        assert_eq!(runner.key, key);
        assert_eq!(runner.train_state.step_count, 0);
    }

    #[test]
    fn runs_configured_number_of_updates() {
        let out = trainer(small_config()).unwrap().train().unwrap();
        assert_eq!(out.phase, Phase::Done);
        assert_eq!(out.metrics.len(), 3);
        // 2 epochs x 4 minibatches per update
        assert_eq!(out.runner_state.train_state.step_count, 3 * 2 * 4);
        for (i, m) in out.metrics.iter().enumerate() {
            assert_eq!(m.update, i);
            assert!(m.total_loss.is_finite());
        }
        // episodes last 4 steps and every rollout has 8
        assert!(out.metrics.iter().all(|m| m.mean_episode_return.is_some()));
    }

    #[test]
    fn learning_rate_anneals_per_update() {
        let out = trainer(small_config()).unwrap().train().unwrap();
        let lrs: Vec<f64> = out.metrics.iter().map(|m| m.learning_rate).collect();
        assert!((lrs[0] - 1e-3).abs() < 1e-15);
        assert!((lrs[1] - 1e-3 * 2.0 / 3.0).abs() < 1e-15);
        assert!((lrs[2] - 1e-3 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn constant_learning_rate_without_anneal() {
        let config = IppoConfig {
            anneal_lr: false,
            ..small_config()
        };
        let out = trainer(config).unwrap().train().unwrap();
        assert!(out.metrics.iter().all(|m| m.learning_rate == 1e-3));
    }

    #[test]
    fn same_key_same_run() {
        let t = trainer(small_config()).unwrap();
        let a = t.train_with_key(PrngKey::new(4)).unwrap();
        let b = t.train_with_key(PrngKey::new(4)).unwrap();
        assert_same_runner(&a.runner_state, &b.runner_state);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn seeds_match_individual_runs() {
        let config = IppoConfig {
            num_seeds: 3,
            ..small_config()
        };
        let t = trainer(config).unwrap();
        let outs = t.train_seeds().unwrap();
        assert_eq!(outs.len(), 3);
        for (out, key) in outs.iter().zip(PrngKey::new(11).split_n(3)) {
            let single = t.train_with_key(key).unwrap();
            assert_same_runner(&out.runner_state, &single.runner_state);
        }
        assert_ne!(
            outs[0].runner_state.train_state.network.flat_params().unwrap(),
            outs[1].runner_state.train_state.network.flat_params().unwrap()
        );
    }

    #[test]
    fn indivisible_batch_fails_before_training() {
        let config = IppoConfig {
            num_minibatches: 3,
            ..small_config()
        };
        assert!(matches!(trainer(config), Err(IppoError::BatchSizeMismatch { .. })));
    }

    #[test]
    fn action_count_mismatch_is_rejected() {
        let result = IppoTrainer::new(SignalMatch::new(2, 3, 4), MlpSpec::new(5, 8), small_config());
        assert!(matches!(result, Err(IppoError::InvalidConfig(_))));
    }

    #[test]
    fn matching_action_count_is_accepted() {
        assert!(check_spaces(&SignalMatch::new(2, 3, 4), 3).is_ok());
        assert!(check_spaces(&SignalMatch::new(2, 3, 4), 2).is_err());
    }
}
