// src/state.rs

//! Program state names and the per-program state-times record.
//!
//! A program's lifetime is described by the built-in lifecycle states plus
//! any user-defined states declared in its `state.log` / `state.file`
//! configuration. Both live in one namespace; equality is over names, so a
//! dependency item like `svc: ready` compares against whatever `svc`
//! actually reached.

use std::fmt;

/// The built-in lifecycle states every program shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinState {
    Initialized,
    Started,
    ActionSuccess,
    ActionFailure,
    ServiceFailure,
    Stopped,
    Final,
}

impl BuiltinState {
    pub const ALL: [BuiltinState; 7] = [
        BuiltinState::Initialized,
        BuiltinState::Started,
        BuiltinState::ActionSuccess,
        BuiltinState::ActionFailure,
        BuiltinState::ServiceFailure,
        BuiltinState::Stopped,
        BuiltinState::Final,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinState::Initialized => "initialized",
            BuiltinState::Started => "started",
            BuiltinState::ActionSuccess => "action_success",
            BuiltinState::ActionFailure => "action_failure",
            BuiltinState::ServiceFailure => "service_failure",
            BuiltinState::Stopped => "stopped",
            BuiltinState::Final => "final",
        }
    }

    /// Terminal classifications; always followed by `final`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuiltinState::ActionSuccess
                | BuiltinState::ActionFailure
                | BuiltinState::ServiceFailure
                | BuiltinState::Stopped
        )
    }
}

/// A state name: one of the built-ins, or a user-defined state declared in
/// a program's `state.log` / `state.file` maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateId {
    Builtin(BuiltinState),
    User(String),
}

impl StateId {
    /// Parse a state name from configuration. Built-in names resolve to
    /// their variant; everything else is a user state.
    pub fn parse(name: &str) -> StateId {
        for builtin in BuiltinState::ALL {
            if builtin.name() == name {
                return StateId::Builtin(builtin);
            }
        }
        StateId::User(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            StateId::Builtin(b) => b.name(),
            StateId::User(name) => name,
        }
    }

    /// Whether `name` collides with a reserved built-in state name.
    pub fn is_builtin_name(name: &str) -> bool {
        BuiltinState::ALL.iter().any(|b| b.name() == name)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<BuiltinState> for StateId {
    fn from(b: BuiltinState) -> Self {
        StateId::Builtin(b)
    }
}

/// When each state was first reached, in seconds since the clock origin.
///
/// First entry wins: re-entering a state does not update its timestamp.
/// Insertion order is the transition order, which is what the state-times
/// artifact preserves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTimes {
    entries: Vec<(StateId, f64)>,
}

impl StateTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state` at `at` seconds. Returns false if the state was
    /// already present (and leaves the original timestamp untouched).
    pub fn record(&mut self, state: StateId, at: f64) -> bool {
        if self.contains(&state) {
            return false;
        }
        self.entries.push((state, at));
        true
    }

    pub fn contains(&self, state: &StateId) -> bool {
        self.entries.iter().any(|(s, _)| s == state)
    }

    pub fn get(&self, state: &StateId) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| s == state)
            .map(|&(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateId, f64)> {
        self.entries.iter().map(|(s, t)| (s, *t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_round_trip_through_parse() {
        for builtin in BuiltinState::ALL {
            assert_eq!(StateId::parse(builtin.name()), StateId::Builtin(builtin));
        }
    }

    #[test]
    fn unknown_name_parses_as_user_state() {
        assert_eq!(
            StateId::parse("ready"),
            StateId::User("ready".to_string())
        );
        assert!(!StateId::is_builtin_name("ready"));
        assert!(StateId::is_builtin_name("action_success"));
    }

    #[test]
    fn first_entry_wins() {
        let mut times = StateTimes::new();
        assert!(times.record(BuiltinState::Initialized.into(), 0.0));
        assert!(times.record(StateId::User("ready".into()), 1.5));
        assert!(!times.record(StateId::User("ready".into()), 3.0));
        assert_eq!(times.get(&StateId::User("ready".into())), Some(1.5));
        assert_eq!(times.len(), 2);
    }
}
