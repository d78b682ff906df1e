// Steps one environment with uniformly random actions and prints what comes back.
//
//   cargo run --example random_rollout -- --steps 12

use clap::Parser;

use ippo::env::log_wrapper::RETURNED_EPISODE_RETURNS;
use ippo::env::{LogWrapper, MultiAgentEnv, SignalMatch, SpaceSample};
use ippo::{AgentMap, PrngKey};

#[derive(Parser)]
#[command(about = "Random-action rollout of the signal matching game")]
struct Args {
    #[arg(long, default_value_t = 2)]
    agents: usize,

    #[arg(long, default_value_t = 3)]
    signals: usize,

    /// Episode length.
    #[arg(long, default_value_t = 5)]
    max_steps: usize,

    /// Steps to run; episodes auto-reset.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ippo::Result<()> {
    let args = Args::parse();
    let env = LogWrapper::new(SignalMatch::new(args.agents, args.signals, args.max_steps));

    let (mut key, key_reset) = PrngKey::new(args.seed).split();
    let (mut obs, mut state) = env.reset(key_reset);
    println!("agents: {:?}", env.agents());

    for t in 0..args.steps {
        let (k, key_act) = key.split();
        let (k, key_step) = k.split();
        key = k;

        let mut actions = AgentMap::new();
        for (agent, k) in env.agents().iter().zip(key_act.split_n(env.num_agents())) {
            if let SpaceSample::Discrete(a) = env.action_space(agent).sample(k) {
                actions.insert(agent.clone(), a);
            }
        }

        let out = env.step(key_step, &state, &actions)?;
        for agent in env.agents() {
            println!(
                "t={:<3} {:<8} obs={:?} action={} reward={}",
                t, agent, obs[agent], actions[agent], out.rewards[agent]
            );
        }
        if out.is_done_all() {
            println!(
                "episode finished, returns {:?}",
                out.info[RETURNED_EPISODE_RETURNS]
            );
        }
        obs = out.observations;
        state = out.state;
    }
    Ok(())
}
