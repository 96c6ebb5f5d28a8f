// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::model::ConfigFile;
use crate::config::validate::validate_config;
use crate::errors::ConfigError;

/// Load a configuration file from a given path and return the raw
/// `ConfigFile`.
///
/// This only performs YAML deserialization; it does **not** merge the
/// `services:` synonym section, resolve paths, or run semantic validation.
/// Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing YAML config from {:?}", path))?;

    Ok(config)
}

/// Load a configuration file from path, preprocess it, and validate it.
///
/// This is the entry point the rest of the application uses:
///
/// - Reads YAML (defaults applied by `serde` + `Default` impls).
/// - Merges `services:` into `tasks:` (duplicate names are an error).
/// - Auto-fills missing `stdout_path`/`stderr_path` and resolves relative
///   paths against `run_dir` / `work_dir`.
/// - Checks dependency references, state names, DAG acyclicity and log
///   path uniqueness.
pub fn load_and_validate(
    path: impl AsRef<Path>,
    run_dir: &Path,
    work_dir: &Path,
) -> Result<ConfigFile> {
    let mut config = load_from_path(&path)?;
    merge_services(&mut config)?;
    preprocess(&mut config, run_dir, work_dir);
    validate_config(&config)?;
    Ok(config)
}

/// Fold the `services:` synonym section into `tasks:`.
pub fn merge_services(config: &mut ConfigFile) -> Result<()> {
    let services = std::mem::take(&mut config.services);
    for (name, program) in services {
        if config.tasks.contains_key(&name) {
            return Err(ConfigError::DuplicateProgram(name).into());
        }
        config.tasks.insert(name, program);
    }
    Ok(())
}

/// Fill in missing per-program log paths and anchor relative paths.
///
/// Output-side paths (`stdout_path`, `stderr_path`, `output.*`,
/// `stop_signal`) resolve against `run_dir`. `state.file.path` resolves
/// against `work_dir`, since that is where the children run and where
/// files they create with relative names land.
pub fn preprocess(config: &mut ConfigFile, run_dir: &Path, work_dir: &Path) {
    for (name, program) in config.tasks.iter_mut() {
        let stdout = program
            .stdout_path
            .take()
            .unwrap_or_else(|| PathBuf::from(format!("{name}_stdout.log")));
        let stderr = program
            .stderr_path
            .take()
            .unwrap_or_else(|| PathBuf::from(format!("{name}_stderr.log")));
        program.stdout_path = Some(resolve(run_dir, stdout));
        program.stderr_path = Some(resolve(run_dir, stderr));

        if let Some(file) = program.state.file.as_mut() {
            file.path = resolve(work_dir, std::mem::take(&mut file.path));
        }
    }

    config.output.state_times = resolve(run_dir, std::mem::take(&mut config.output.state_times));
    if let Some(p) = config.output.stdout.take() {
        config.output.stdout = Some(resolve(run_dir, p));
    }
    if let Some(p) = config.output.stderr.take() {
        config.output.stderr = Some(resolve(run_dir, p));
    }
    if let Some(p) = config.stop_signal.take() {
        config.stop_signal = Some(resolve(run_dir, p));
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
