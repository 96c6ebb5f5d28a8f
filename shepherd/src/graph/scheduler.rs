// src/graph/scheduler.rs

use std::collections::HashSet;

use tracing::debug;

use crate::config::model::PredicateMode;
use crate::graph::programs::{ProgramArena, ProgramId};
use crate::state::StateId;

/// Dependency predicate of one program, resolved to arena indices.
#[derive(Debug, Clone)]
struct DepSpec {
    mode: PredicateMode,
    items: Vec<(ProgramId, StateId)>,
}

/// Decides when each program becomes eligible to start.
///
/// The scheduler keeps its own record of the state watermarks every
/// program has reached. A required state is a watermark: once a peer has
/// reached-or-passed it, the requirement stays satisfied even if the peer
/// later fails. `deps_satisfied` latches — each program is released at
/// most once.
#[derive(Debug)]
pub struct DepScheduler {
    deps: Vec<DepSpec>,
    reached: Vec<HashSet<StateId>>,
    released: Vec<bool>,
}

impl DepScheduler {
    pub fn new(arena: &ProgramArena) -> Self {
        let deps = arena
            .iter()
            .map(|spec| DepSpec {
                mode: spec.dep_mode,
                items: spec.deps.clone(),
            })
            .collect();
        Self {
            deps,
            reached: vec![HashSet::new(); arena.len()],
            released: vec![false; arena.len()],
        }
    }

    /// Programs with no declared dependencies, eligible immediately at
    /// startup. Marks them released.
    pub fn initial_ready(&mut self) -> Vec<ProgramId> {
        self.collect_newly_satisfied()
    }

    /// Record that `program` reached `state` and return any programs whose
    /// predicate this newly satisfies.
    pub fn record_state(&mut self, program: ProgramId, state: &StateId) -> Vec<ProgramId> {
        self.reached[program.0].insert(state.clone());
        self.collect_newly_satisfied()
    }

    pub fn is_released(&self, program: ProgramId) -> bool {
        self.released[program.0]
    }

    fn collect_newly_satisfied(&mut self) -> Vec<ProgramId> {
        let mut ready = Vec::new();
        for idx in 0..self.deps.len() {
            if !self.released[idx] && self.satisfied(idx) {
                debug!(program = idx, "dependencies satisfied");
                self.released[idx] = true;
                ready.push(ProgramId(idx));
            }
        }
        ready
    }

    fn satisfied(&self, idx: usize) -> bool {
        let spec = &self.deps[idx];
        let reached = |&(peer, ref state): &(ProgramId, StateId)| -> bool {
            self.reached[peer.0].contains(state)
        };
        match spec.mode {
            PredicateMode::All => spec.items.iter().all(reached),
            PredicateMode::Any => !spec.items.is_empty() && spec.items.iter().any(reached),
        }
    }
}
