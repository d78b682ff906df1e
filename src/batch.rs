//! Batch adapter between agent-keyed dictionaries and flat actor arrays.
//!
//! The environment boundary speaks in `agent -> (num_envs, feature_dim)`
//! dictionaries; the network speaks in `(num_actors, feature_dim)` arrays.
//! Actor slot `agent_index * num_envs + env_index` always belongs to
//! `agent_list[agent_index]` in environment `env_index`.

use std::collections::HashMap;

use crate::array::Array2;
use crate::error::{IppoError, Result};

/// Sentinel key in done dictionaries meaning "episode over for every agent".
pub const DONE_ALL: &str = "__all__";

/// Agent identifier to per-agent value.
pub type AgentMap<T> = HashMap<String, T>;

fn check_keys<V>(agent_dict: &AgentMap<V>, agent_list: &[String]) -> Result<()> {
    for key in agent_dict.keys() {
        if key != DONE_ALL && !agent_list.iter().any(|a| a == key) {
            return Err(IppoError::UnexpectedAgent(key.clone()));
        }
    }
    for agent in agent_list {
        if !agent_dict.contains_key(agent) {
            return Err(IppoError::MissingAgent(agent.clone()));
        }
    }
    Ok(())
}

/// Stacks `agent_dict` in `agent_list` order into a `(num_actors, feature_dim)` array.
///
/// The [`DONE_ALL`] sentinel is ignored; any other key outside `agent_list`
/// is rejected.
pub fn batchify<T: Clone>(
    agent_dict: &AgentMap<Array2<T>>,
    agent_list: &[String],
    num_actors: usize,
) -> Result<Array2<T>> {
    check_keys(agent_dict, agent_list)?;
    if agent_list.is_empty() || num_actors % agent_list.len() != 0 {
        return Err(IppoError::shape(
            "batchify",
            format!("num_actors divisible by {} agents", agent_list.len()),
            num_actors,
        ));
    }
    let per_agent = num_actors / agent_list.len();
    let feature_dim = agent_dict[&agent_list[0]].cols();

    let mut parts = Vec::with_capacity(agent_list.len());
    for agent in agent_list {
        let value = &agent_dict[agent];
        if value.shape() != (per_agent, feature_dim) {
            return Err(IppoError::shape(
                "batchify",
                format!("({}, {}) for {}", per_agent, feature_dim, agent),
                format!("({}, {})", value.rows(), value.cols()),
            ));
        }
        parts.push(value.clone());
    }
    Array2::concat_rows(&parts)
}

/// Splits a `(num_agents * num_envs, feature_dim)` array back into agent-keyed
/// `(num_envs, feature_dim)` arrays.
pub fn unbatchify<T: Clone>(
    flat: &Array2<T>,
    agent_list: &[String],
    num_envs: usize,
    num_agents: usize,
) -> Result<AgentMap<Array2<T>>> {
    if agent_list.len() != num_agents {
        return Err(IppoError::shape(
            "unbatchify",
            format!("{} agents", num_agents),
            agent_list.len(),
        ));
    }
    if flat.rows() != num_agents * num_envs {
        return Err(IppoError::shape(
            "unbatchify",
            format!("{} rows", num_agents * num_envs),
            flat.rows(),
        ));
    }
    Ok(agent_list
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            (
                agent.clone(),
                flat.slice_rows(i * num_envs, (i + 1) * num_envs),
            )
        })
        .collect())
}

/// Stacks per-environment vector dictionaries along a leading env axis.
pub fn stack_envs<T: Clone>(
    per_env: &[AgentMap<Vec<T>>],
    agent_list: &[String],
) -> Result<AgentMap<Array2<T>>> {
    let mut out = AgentMap::with_capacity(agent_list.len());
    for agent in agent_list {
        let rows = per_env
            .iter()
            .map(|env| {
                env.get(agent)
                    .cloned()
                    .ok_or_else(|| IppoError::MissingAgent(agent.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        out.insert(agent.clone(), Array2::from_rows(&rows)?);
    }
    Ok(out)
}

/// Stacks per-environment scalar dictionaries into `(num_envs, 1)` columns.
pub fn stack_env_scalars<T: Clone>(
    per_env: &[AgentMap<T>],
    agent_list: &[String],
) -> Result<AgentMap<Array2<T>>> {
    let mut out = AgentMap::with_capacity(agent_list.len());
    for agent in agent_list {
        let column = per_env
            .iter()
            .map(|env| {
                env.get(agent)
                    .cloned()
                    .ok_or_else(|| IppoError::MissingAgent(agent.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        out.insert(agent.clone(), Array2::column(column));
    }
    Ok(out)
}

/// Inverse of [`stack_env_scalars`]: one scalar dictionary per environment.
pub fn split_env_scalars<T: Clone>(
    agent_dict: &AgentMap<Array2<T>>,
    agent_list: &[String],
    num_envs: usize,
) -> Result<Vec<AgentMap<T>>> {
    check_keys(agent_dict, agent_list)?;
    let mut out = vec![AgentMap::with_capacity(agent_list.len()); num_envs];
    for agent in agent_list {
        let column = &agent_dict[agent];
        if column.shape() != (num_envs, 1) {
            return Err(IppoError::shape(
                "split_env_scalars",
                format!("({}, 1)", num_envs),
                format!("({}, {})", column.rows(), column.cols()),
            ));
        }
        for (env, slot) in out.iter_mut().enumerate() {
            slot.insert(agent.clone(), column[(env, 0)].clone());
        }
    }
    Ok(out)
}
