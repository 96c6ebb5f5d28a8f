use std::path::PathBuf;

use shepherd::config::{
    ConfigFile, FileStates, OutputSection, Predicate, PredicateMode, ProgramConfig, ProgramKind,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    /// `state_times` is the only required output location.
    pub fn new(state_times: impl Into<PathBuf>) -> Self {
        Self {
            config: ConfigFile::new(OutputSection::state_times(state_times.into())),
        }
    }

    pub fn with_program(mut self, name: &str, program: ProgramConfig) -> Self {
        self.config.tasks.insert(name.to_string(), program);
        self
    }

    pub fn stop_signal(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stop_signal = Some(path.into());
        self
    }

    pub fn max_run_time(mut self, seconds: f64) -> Self {
        self.config.max_run_time = Some(seconds);
        self
    }

    pub fn process_timeout(mut self, seconds: f64) -> Self {
        self.config.process_timeout = seconds;
        self
    }

    pub fn success_criteria(mut self, mode: PredicateMode, items: &[(&str, &str)]) -> Self {
        let mut predicate = Predicate {
            mode,
            ..Predicate::default()
        };
        for (program, state) in items {
            predicate
                .items
                .insert(program.to_string(), state.to_string());
        }
        self.config.success_criteria = Some(predicate);
        self
    }

    pub fn build(self) -> ConfigFile {
        self.config
    }
}

/// Builder for `ProgramConfig`.
pub struct ProgramConfigBuilder {
    program: ProgramConfig,
}

impl ProgramConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            program: ProgramConfig::new(command),
        }
    }

    pub fn service(mut self) -> Self {
        self.program.kind = ProgramKind::Service;
        self
    }

    pub fn stdout_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.program.stdout_path = Some(path.into());
        self
    }

    pub fn stderr_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.program.stderr_path = Some(path.into());
        self
    }

    pub fn monitor_log(mut self, value: bool) -> Self {
        self.program.monitor_log = value;
        self
    }

    pub fn log_state(mut self, state: &str, pattern: &str) -> Self {
        self.program
            .state
            .log
            .insert(state.to_string(), pattern.to_string());
        self
    }

    pub fn file_states(mut self, path: impl Into<PathBuf>, states: &[(&str, &str)]) -> Self {
        let mut file = FileStates {
            path: path.into(),
            states: Default::default(),
        };
        for (state, pattern) in states {
            file.states.insert(state.to_string(), pattern.to_string());
        }
        self.program.state.file = Some(file);
        self
    }

    pub fn depends_on(mut self, peer: &str, state: &str) -> Self {
        self.program
            .dependency
            .items
            .insert(peer.to_string(), state.to_string());
        self
    }

    pub fn dep_mode(mut self, mode: PredicateMode) -> Self {
        self.program.dependency.mode = mode;
        self
    }

    pub fn build(self) -> ProgramConfig {
        self.program
    }
}
