// src/errors.rs

//! Crate-wide error aliases and the configuration error taxonomy.
//!
//! Configuration errors are fatal at load time and name the offending
//! program, state or path so the report points at the location in the
//! document. Everything downstream of a validated config propagates
//! through `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("program '{0}' is defined under both `tasks` and `services`")]
    DuplicateProgram(String),

    #[error("program '{program}' declares reserved state name '{state}'")]
    ReservedState { program: String, state: String },

    #[error("program '{program}' declares state '{state}' more than once")]
    DuplicateState { program: String, state: String },

    #[error("program '{program}' depends on unknown program '{peer}'")]
    UnknownPeer { program: String, peer: String },

    #[error(
        "program '{program}' depends on '{peer}: {state}', \
         but '{peer}' can never reach '{state}'"
    )]
    UnreachableDepState {
        program: String,
        peer: String,
        state: String,
    },

    #[error("program '{program}' cannot depend on itself")]
    SelfDependency { program: String },

    #[error("cycle detected in the dependency graph involving program '{0}'")]
    DependencyCycle(String),

    #[error("log path {path:?} is configured for more than one stream")]
    DuplicateLogPath { path: PathBuf },

    #[error("program '{program}' sets state.file.path but declares no state.file.states")]
    FileStatesMissing { program: String },

    #[error("success criteria reference unknown program '{0}'")]
    UnknownCriteriaProgram(String),

    #[error(
        "success criteria require '{program}: {state}', \
         but '{program}' can never reach '{state}'"
    )]
    UnreachableCriteriaState { program: String, state: String },

    #[error("success criteria declare no items")]
    EmptyCriteria,
}

pub use anyhow::{Error, Result};
