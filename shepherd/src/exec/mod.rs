// src/exec/mod.rs

//! Process supervision layer.
//!
//! Runs the commands defined for each program with
//! `tokio::process::Command`, each child in its own process group with its
//! streams piped through the tailers into the configured log files, and
//! reports back to the runtime via `EngineEvent`s. Graceful stop is
//! SIGTERM to the group, a grace period, then SIGKILL.

pub mod command;

pub use command::{spawn_executor, LaunchRequest};
