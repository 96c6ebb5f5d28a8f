// src/graph/programs.rs

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::model::{ConfigFile, PredicateMode, ProgramKind};
use crate::state::StateId;

/// Index into the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub usize);

/// Immutable per-program record derived from a validated configuration.
#[derive(Debug, Clone)]
pub struct ProgramSpec {
    pub id: ProgramId,
    pub name: String,
    pub kind: ProgramKind,
    pub command: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub monitor_log: bool,
    /// User state → substring, matched against stdout and stderr lines.
    pub log_states: Vec<(StateId, String)>,
    pub file_states: Option<FileStateSpec>,
    pub dep_mode: PredicateMode,
    /// Resolved dependency edges: `(peer, required state watermark)`.
    pub deps: Vec<(ProgramId, StateId)>,
}

/// Patterns matched against the appended content of a file the program is
/// expected to produce.
#[derive(Debug, Clone)]
pub struct FileStateSpec {
    pub path: PathBuf,
    pub states: Vec<(StateId, String)>,
}

/// Index-keyed table of program records plus dependency adjacency.
///
/// Dependency edges are pairs of indices, so cycle detection and watermark
/// propagation are plain walks over small vectors with no shared ownership.
#[derive(Debug, Clone)]
pub struct ProgramArena {
    programs: Vec<ProgramSpec>,
    by_name: HashMap<String, ProgramId>,
    /// Reverse edges: programs that depend on the indexed program.
    dependents: Vec<Vec<ProgramId>>,
}

impl ProgramArena {
    /// Build the arena from a merged, preprocessed, validated config.
    pub fn from_config(config: &ConfigFile) -> Self {
        let mut by_name = HashMap::new();
        for (idx, name) in config.tasks.keys().enumerate() {
            by_name.insert(name.clone(), ProgramId(idx));
        }

        let mut programs = Vec::with_capacity(config.tasks.len());
        let mut dependents = vec![Vec::new(); config.tasks.len()];

        for (idx, (name, pc)) in config.tasks.iter().enumerate() {
            let id = ProgramId(idx);

            let deps: Vec<(ProgramId, StateId)> = pc
                .dependency
                .items
                .iter()
                .filter_map(|(peer, state)| {
                    by_name.get(peer).map(|&pid| (pid, StateId::parse(state)))
                })
                .collect();
            for &(peer, _) in &deps {
                dependents[peer.0].push(id);
            }

            let log_states = pc
                .state
                .log
                .iter()
                .map(|(s, pat)| (StateId::parse(s), pat.clone()))
                .collect();

            let file_states = pc.state.file.as_ref().map(|f| FileStateSpec {
                path: f.path.clone(),
                states: f
                    .states
                    .iter()
                    .map(|(s, pat)| (StateId::parse(s), pat.clone()))
                    .collect(),
            });

            programs.push(ProgramSpec {
                id,
                name: name.clone(),
                kind: pc.kind,
                command: pc.command.clone(),
                stdout_path: pc
                    .stdout_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(format!("{name}_stdout.log"))),
                stderr_path: pc
                    .stderr_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(format!("{name}_stderr.log"))),
                monitor_log: pc.monitor_log,
                log_states,
                file_states,
                dep_mode: pc.dependency.mode,
                deps,
            });
        }

        Self {
            programs,
            by_name,
            dependents,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, id: ProgramId) -> &ProgramSpec {
        &self.programs[id.0]
    }

    pub fn id_of(&self, name: &str) -> Option<ProgramId> {
        self.by_name.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = ProgramId> {
        (0..self.programs.len()).map(ProgramId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgramSpec> {
        self.programs.iter()
    }

    /// Immediate dependents of a program (programs that list it in their
    /// dependency items).
    pub fn dependents_of(&self, id: ProgramId) -> &[ProgramId] {
        &self.dependents[id.0]
    }
}
