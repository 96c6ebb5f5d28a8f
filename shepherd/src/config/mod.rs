// src/config/mod.rs

//! Configuration loading and validation for shepherd.
//!
//! Responsibilities:
//! - Define the YAML-backed data model (`model.rs`).
//! - Load a config file from disk, merge the `services:` synonym section
//!   and resolve paths (`loader.rs`).
//! - Validate semantic invariants like DAG correctness, state-name
//!   references and log-path uniqueness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, merge_services, preprocess};
pub use model::{
    ConfigFile, FileStates, OutputSection, Predicate, PredicateMode, ProgramConfig, ProgramKind,
    StateSection,
};
pub use validate::validate_config;
