// src/fsm.rs

//! Per-program state machine.
//!
//! Each program owns one [`ProgramFsm`]; only the runtime writes to it.
//! Transitions record first-entry timestamps into [`StateTimes`], terminal
//! classifications are immediately followed by `final`, and any event
//! aimed at a final program is discarded.

use tracing::debug;

use crate::config::model::ProgramKind;
use crate::state::{BuiltinState, StateId, StateTimes};

/// How a child process ended, as observed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDisposition {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitDisposition {
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

/// One program's current state, stop bookkeeping and transition times.
#[derive(Debug, Clone)]
pub struct ProgramFsm {
    name: String,
    kind: ProgramKind,
    state: StateId,
    stop_requested: bool,
    times: StateTimes,
}

impl ProgramFsm {
    /// A fresh FSM in `initialized`, recorded at `at` seconds.
    pub fn new(name: impl Into<String>, kind: ProgramKind, at: f64) -> Self {
        let mut times = StateTimes::new();
        times.record(BuiltinState::Initialized.into(), at);
        Self {
            name: name.into(),
            kind,
            state: BuiltinState::Initialized.into(),
            stop_requested: false,
            times,
        }
    }

    pub fn state(&self) -> &StateId {
        &self.state
    }

    pub fn is_final(&self) -> bool {
        self.state == StateId::Builtin(BuiltinState::Final)
    }

    pub fn times(&self) -> &StateTimes {
        &self.times
    }

    /// Watermark test: has this program reached-or-passed `state`?
    pub fn reached(&self, state: &StateId) -> bool {
        self.times.contains(state)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// A graceful stop has been issued for this program. Only affects how
    /// a later exit is classified.
    pub fn mark_stop_requested(&mut self) {
        self.stop_requested = true;
    }

    /// The child was spawned: `initialized -> started`.
    pub fn on_spawned(&mut self, at: f64) -> Vec<StateId> {
        if self.state != StateId::Builtin(BuiltinState::Initialized) {
            debug!(program = %self.name, state = %self.state, "spawn event ignored");
            return Vec::new();
        }
        vec![self.enter(BuiltinState::Started.into(), at)]
    }

    /// A tailer matched one of this program's patterns.
    pub fn on_pattern(&mut self, state: StateId, at: f64) -> Vec<StateId> {
        let accepting = matches!(
            self.state,
            StateId::Builtin(BuiltinState::Started) | StateId::User(_)
        );
        if !accepting {
            debug!(program = %self.name, state = %state, "pattern event discarded");
            return Vec::new();
        }
        if self.times.contains(&state) {
            return Vec::new();
        }
        vec![self.enter(state, at)]
    }

    /// The command could not be spawned: straight to the failure terminal,
    /// never passing through `started`.
    pub fn on_spawn_failed(&mut self, at: f64) -> Vec<StateId> {
        if self.is_final() {
            return Vec::new();
        }
        let terminal = match self.kind {
            ProgramKind::Action => BuiltinState::ActionFailure,
            ProgramKind::Service => BuiltinState::ServiceFailure,
        };
        self.finish(terminal, at)
    }

    /// The child exited; classify the terminal state.
    pub fn on_exit(&mut self, disposition: ExitDisposition, at: f64) -> Vec<StateId> {
        if self.is_final() {
            debug!(program = %self.name, "exit event discarded");
            return Vec::new();
        }
        let terminal = if self.stop_requested {
            BuiltinState::Stopped
        } else {
            match self.kind {
                ProgramKind::Action if disposition.success() => BuiltinState::ActionSuccess,
                ProgramKind::Action => BuiltinState::ActionFailure,
                ProgramKind::Service => BuiltinState::ServiceFailure,
            }
        };
        self.finish(terminal, at)
    }

    /// Stop issued before the program was ever spawned: there is no child
    /// to signal, so the program is terminal right away.
    pub fn finish_without_start(&mut self, at: f64) -> Vec<StateId> {
        if self.is_final() {
            return Vec::new();
        }
        self.stop_requested = true;
        self.finish(BuiltinState::Stopped, at)
    }

    fn finish(&mut self, terminal: BuiltinState, at: f64) -> Vec<StateId> {
        vec![
            self.enter(terminal.into(), at),
            self.enter(BuiltinState::Final.into(), at),
        ]
    }

    fn enter(&mut self, state: StateId, at: f64) -> StateId {
        debug!(program = %self.name, from = %self.state, to = %state, at, "state transition");
        self.times.record(state.clone(), at);
        self.state = state.clone();
        state
    }
}
