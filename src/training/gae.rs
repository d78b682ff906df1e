//! Generalized Advantage Estimation (GAE-λ).
//!
//! Computes advantages and value targets from a trajectory and a bootstrap
//! value for the state after its last step.

use super::trajectory::Trajectory;
use crate::error::{IppoError, Result};

/// Advantages and value targets, `[horizon][num_actors]`, parallel to the trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct GaeOutput {
    pub advantages: Vec<Vec<f64>>,
    pub targets: Vec<Vec<f64>>,
}

/// GAE over every actor slot of `trajectory` at once.
///
/// Runs the recursion backwards in time,
/// `δ_t = r_t + γ·V_{t+1}·(1 - d_t) - V_t` and
/// `A_t = δ_t + γ·λ·(1 - d_t)·A_{t+1}`,
/// independently per slot. `last_values[a]` bootstraps slot `a` past the
/// final step; a done step cuts both the bootstrap and the carried advantage.
/// Targets are `A_t + V_t`.
pub fn calculate_gae(
    trajectory: &Trajectory,
    last_values: &[f64],
    gamma: f64,
    gae_lambda: f64,
) -> Result<GaeOutput> {
    let num_actors = trajectory.num_actors();
    if last_values.len() != num_actors {
        return Err(IppoError::shape("calculate_gae", num_actors, last_values.len()));
    }

    let mut advantages = vec![Vec::new(); trajectory.len()];
    let mut running = vec![0.0; num_actors];
    let mut next_values = last_values.to_vec();

    for (t, step) in trajectory.steps().iter().enumerate().rev() {
        for (a, (acc, next)) in running.iter_mut().zip(next_values.iter_mut()).enumerate() {
            let continues = if step.done[a] { 0.0 } else { 1.0 };
            let delta = step.reward[a] + gamma * *next * continues - step.value[a];
            *acc = delta + gamma * gae_lambda * continues * *acc;
            *next = step.value[a];
        }
        advantages[t] = running.clone();
    }

    let targets = advantages
        .iter()
        .zip(trajectory.steps())
        .map(|(adv, step)| adv.iter().zip(&step.value).map(|(a, v)| a + v).collect())
        .collect();

    Ok(GaeOutput {
        advantages,
        targets,
    })
}
