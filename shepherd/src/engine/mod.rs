// src/engine/mod.rs

//! Orchestration engine for shepherd.
//!
//! This module ties together:
//! - the runtime event loop that owns every program's FSM and reacts to
//!   pattern hits, spawn/exit reports and shutdown triggers
//! - the terminal-condition arbiter (stop-signal file, max run time,
//!   OS signals, success criteria)

pub mod arbiter;
pub mod runtime;

pub use arbiter::{Criteria, STOP_FILE_POLL_INTERVAL};
pub use runtime::{
    Disposition, EngineEvent, GraphReport, Runtime, RuntimeOptions, ShutdownCause,
};
