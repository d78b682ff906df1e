//! ippo - Independent PPO for vectorized multi-agent environments
//!
//! Collects rollouts from a batch of environment instances, estimates
//! advantages with GAE and trains one shared actor-critic with the
//! clipped PPO objective. Every stochastic step draws from an explicitly
//! split [`PrngKey`], so a run is a pure function of its seed.
//!
//! Networks, losses and optimization run on libtorch through `tch`, behind
//! the `rl-nn` feature.

pub mod array;
pub mod batch;
pub mod config;
pub mod env;
pub mod error;
pub mod key;
pub mod optim;
#[cfg(feature = "rl-nn")]
pub mod policy;
pub mod training;

pub use array::Array2;
pub use batch::{batchify, unbatchify, AgentMap, DONE_ALL};
pub use config::IppoConfig;
pub use error::{IppoError, Result};
pub use key::PrngKey;
pub use training::UpdateMetrics;
#[cfg(feature = "rl-nn")]
pub use training::{IppoTrainer, Phase, TrainOutput};
