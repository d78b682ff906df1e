// Trains IPPO on the signal matching game and prints per-update statistics.
//
//   RUST_LOG=ippo=debug cargo run --release --features rl-nn --example train_signal_match -- --seeds 4

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ippo::env::{LogWrapper, SignalMatch};
use ippo::policy::MlpSpec;
use ippo::{IppoConfig, IppoTrainer};

#[derive(Parser)]
#[command(about = "Independent PPO on the signal matching game")]
struct Args {
    #[arg(long, default_value_t = 2)]
    agents: usize,

    #[arg(long, default_value_t = 3)]
    signals: usize,

    #[arg(long, default_value_t = 8)]
    max_steps: usize,

    #[arg(long, default_value_t = 64)]
    hidden: usize,

    #[arg(long, default_value_t = 200_000)]
    total_timesteps: usize,

    #[arg(long, default_value_t = 8)]
    num_envs: usize,

    #[arg(long, default_value_t = 32)]
    num_steps: usize,

    #[arg(long, default_value_t = 2.5e-3)]
    lr: f64,

    #[arg(long, default_value_t = 30)]
    seed: u64,

    /// Independent runs trained in parallel.
    #[arg(long, default_value_t = 1)]
    seeds: usize,
}

fn main() -> ippo::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let config = IppoConfig {
        lr: args.lr,
        num_envs: args.num_envs,
        num_steps: args.num_steps,
        total_timesteps: args.total_timesteps,
        seed: args.seed,
        num_seeds: args.seeds,
        ..IppoConfig::default()
    };
    let env = LogWrapper::new(SignalMatch::new(args.agents, args.signals, args.max_steps));
    let trainer = IppoTrainer::new(env, MlpSpec::new(args.signals, args.hidden), config)?;

    for (seed, out) in trainer.train_seeds()?.iter().enumerate() {
        println!("seed {}", seed);
        for m in &out.metrics {
            println!("  {}", m);
        }
    }
    Ok(())
}
