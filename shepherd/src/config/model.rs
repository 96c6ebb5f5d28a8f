// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration as read from a YAML file.
///
/// This is a direct mapping of the document format:
///
/// ```yaml
/// tasks:
///   build:
///     command: "make all"
///   svc:
///     type: service
///     command: "./server"
///     state:
///       log:
///         ready: "Service is ready"
/// output:
///   state_times: state_times.json
/// max_run_time: 30
/// ```
///
/// `services:` is accepted as a synonym for `tasks:`; the loader merges the
/// two sections and rejects a program name appearing in both.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Programs keyed by name, from `tasks:`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tasks: BTreeMap<String, ProgramConfig>,

    /// Synonym section. Empty after the loader has merged it into `tasks`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, ProgramConfig>,

    /// Output locations; `output.state_times` is required.
    pub output: OutputSection,

    /// Path whose appearance on disk triggers graceful shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<PathBuf>,

    /// Wall-clock limit in seconds, measured from the clock origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_run_time: Option<f64>,

    /// When this predicate becomes true, the graph shuts down and is
    /// considered to have succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Predicate>,

    /// Graceful-stop grace period in seconds (SIGTERM to SIGKILL).
    #[serde(default = "default_process_timeout")]
    pub process_timeout: f64,
}

fn default_process_timeout() -> f64 {
    10.0
}

impl ConfigFile {
    pub fn new(output: OutputSection) -> Self {
        Self {
            tasks: BTreeMap::new(),
            services: BTreeMap::new(),
            output,
            stop_signal: None,
            max_run_time: None,
            success_criteria: None,
            process_timeout: default_process_timeout(),
        }
    }
}

/// `output:` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputSection {
    /// Where the final state-times artifact is written. Required.
    pub state_times: PathBuf,

    /// Optional sink for Shepherd's own log output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,

    /// Optional sink receiving a WARN-and-up copy of Shepherd's log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<PathBuf>,
}

impl OutputSection {
    pub fn state_times(path: impl Into<PathBuf>) -> Self {
        Self {
            state_times: path.into(),
            stdout: None,
            stderr: None,
        }
    }
}

/// One managed program, from `tasks.<name>` / `services.<name>`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramConfig {
    /// "action" (expected to exit; default) or "service" (expected to run
    /// until stopped).
    #[serde(rename = "type", default)]
    pub kind: ProgramKind,

    /// The command to execute.
    pub command: String,

    /// Where the child's stdout is persisted. Auto-filled by the loader as
    /// `<name>_stdout.log` under the run directory when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<PathBuf>,

    /// Where the child's stderr is persisted; auto-filled like
    /// `stdout_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<PathBuf>,

    /// If false, stdout/stderr are not scanned for `state.log` patterns.
    /// File-based states are still honoured.
    #[serde(default = "default_monitor_log")]
    pub monitor_log: bool,

    /// User-defined state declarations.
    #[serde(default, skip_serializing_if = "StateSection::is_empty")]
    pub state: StateSection,

    /// The predicate gating this program's start.
    #[serde(default, skip_serializing_if = "Predicate::is_empty")]
    pub dependency: Predicate,
}

fn default_monitor_log() -> bool {
    true
}

impl ProgramConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            kind: ProgramKind::default(),
            command: command.into(),
            stdout_path: None,
            stderr_path: None,
            monitor_log: default_monitor_log(),
            state: StateSection::default(),
            dependency: Predicate::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramKind {
    #[default]
    Action,
    Service,
}

/// `state:` subsection of a program.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StateSection {
    /// User state name → substring matched against stdout/stderr lines.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub log: BTreeMap<String, String>,

    /// User states extracted from a monitored file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileStates>,
}

impl StateSection {
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.file.is_none()
    }
}

/// `state.file:` — patterns matched against the appended content of `path`.
/// The path may not exist when the program starts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileStates {
    pub path: PathBuf,

    /// User state name → substring. Declaring a path with no states is a
    /// load error.
    #[serde(default)]
    pub states: BTreeMap<String, String>,
}

/// `all`/`any` predicate over peer state watermarks. Used both for
/// per-program dependencies and for the top-level success criteria.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Predicate {
    #[serde(default)]
    pub mode: PredicateMode,

    /// Program name → required state name. The required state is a
    /// watermark: reached-or-passed, not currently-in.
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateMode {
    #[default]
    All,
    Any,
}
