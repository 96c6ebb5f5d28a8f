// src/config/validate.rs

use std::collections::HashSet;
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, ProgramConfig};
use crate::errors::ConfigError;
use crate::state::StateId;

/// Run semantic validation against a loaded configuration.
///
/// Expects `services:` to have been merged into `tasks:` already. Checks:
/// - user state names do not reuse built-ins and are unique per program
/// - `state.file` declares at least one state
/// - every dependency names an existing peer and a state it can produce
/// - the dependency graph has no cycles
/// - no two streams share a log path
/// - the success criteria reference existing programs and states
pub fn validate_config(config: &ConfigFile) -> Result<(), ConfigError> {
    for (name, program) in config.tasks.iter() {
        validate_state_names(name, program)?;
        validate_dependency(config, name, program)?;
    }
    validate_log_paths(config)?;
    validate_criteria(config)?;
    validate_dag(config)?;
    Ok(())
}

fn validate_state_names(name: &str, program: &ProgramConfig) -> Result<(), ConfigError> {
    let mut seen: HashSet<&str> = HashSet::new();

    let file_states = program.state.file.as_ref();
    if let Some(file) = file_states {
        if file.states.is_empty() {
            return Err(ConfigError::FileStatesMissing {
                program: name.to_string(),
            });
        }
    }

    let declared = program
        .state
        .log
        .keys()
        .chain(file_states.map(|f| f.states.keys()).into_iter().flatten());

    for state in declared {
        if StateId::is_builtin_name(state) {
            return Err(ConfigError::ReservedState {
                program: name.to_string(),
                state: state.clone(),
            });
        }
        if !seen.insert(state.as_str()) {
            return Err(ConfigError::DuplicateState {
                program: name.to_string(),
                state: state.clone(),
            });
        }
    }

    Ok(())
}

fn validate_dependency(
    config: &ConfigFile,
    name: &str,
    program: &ProgramConfig,
) -> Result<(), ConfigError> {
    for (peer, state) in program.dependency.items.iter() {
        if peer == name {
            return Err(ConfigError::SelfDependency {
                program: name.to_string(),
            });
        }
        let peer_config = config.tasks.get(peer).ok_or_else(|| ConfigError::UnknownPeer {
            program: name.to_string(),
            peer: peer.clone(),
        })?;
        if !can_produce(peer_config, state) {
            return Err(ConfigError::UnreachableDepState {
                program: name.to_string(),
                peer: peer.clone(),
                state: state.clone(),
            });
        }
    }
    Ok(())
}

/// A peer can produce every built-in state plus its own declared user
/// states.
fn can_produce(program: &ProgramConfig, state: &str) -> bool {
    if StateId::is_builtin_name(state) {
        return true;
    }
    if program.state.log.contains_key(state) {
        return true;
    }
    program
        .state
        .file
        .as_ref()
        .is_some_and(|f| f.states.contains_key(state))
}

fn validate_log_paths(config: &ConfigFile) -> Result<(), ConfigError> {
    let mut seen: HashSet<&PathBuf> = HashSet::new();
    for program in config.tasks.values() {
        for path in [&program.stdout_path, &program.stderr_path]
            .into_iter()
            .flatten()
        {
            if !seen.insert(path) {
                return Err(ConfigError::DuplicateLogPath { path: path.clone() });
            }
        }
    }
    Ok(())
}

fn validate_criteria(config: &ConfigFile) -> Result<(), ConfigError> {
    let criteria = match config.success_criteria.as_ref() {
        Some(c) => c,
        None => return Ok(()),
    };
    if criteria.items.is_empty() {
        return Err(ConfigError::EmptyCriteria);
    }
    for (name, state) in criteria.items.iter() {
        let program = config
            .tasks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCriteriaProgram(name.clone()))?;
        if !can_produce(program, state) {
            return Err(ConfigError::UnreachableCriteriaState {
                program: name.clone(),
                state: state.clone(),
            });
        }
    }
    Ok(())
}

fn validate_dag(config: &ConfigFile) -> Result<(), ConfigError> {
    // Edge direction: dependency -> dependent. A topological sort fails
    // exactly when the graph has a cycle.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in config.tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, program) in config.tasks.iter() {
        for peer in program.dependency.items.keys() {
            graph.add_edge(peer.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ConfigError::DependencyCycle(
            cycle.node_id().to_string(),
        )),
    }
}
