// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fsm;
pub mod graph;
pub mod logging;
pub mod report;
pub mod state;
pub mod tail;

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, ProgramKind};
use crate::engine::{Disposition, Runtime};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - logging (level from flag/env, sinks from flag/config)
/// - the runtime: program FSMs, dependency scheduler, supervisor,
///   tailers and the terminal-condition arbiter
/// - the state-times artifact written once the graph is done
pub async fn run(args: CliArgs) -> Result<Disposition> {
    let run_dir = args.run_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let work_dir = args.work_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let config = load_and_validate(&args.config, &run_dir, &work_dir)?;

    let sink = args.log.clone().or_else(|| config.output.stdout.clone());
    logging::init_logging(
        args.log_level,
        sink.as_deref(),
        config.output.stderr.as_deref(),
    )?;

    if args.dry_run {
        print_dry_run(&config);
        return Ok(Disposition::Success);
    }

    let runtime = Runtime::from_config(&config, work_dir);
    let graph_report = runtime.run().await?;

    report::write_state_times(&config.output.state_times, &graph_report.state_times)?;
    info!(
        disposition = ?graph_report.disposition,
        artifact = ?config.output.state_times,
        "workflow finished"
    );

    Ok(graph_report.disposition)
}

/// Simple dry-run output: print programs, kinds, dependencies and states.
fn print_dry_run(config: &ConfigFile) {
    println!("shepherd dry-run");
    if let Some(limit) = config.max_run_time {
        println!("  max_run_time = {limit}s");
    }
    if let Some(ref path) = config.stop_signal {
        println!("  stop_signal = {}", path.display());
    }
    println!("  process_timeout = {}s", config.process_timeout);
    println!();

    println!("programs ({}):", config.tasks.len());
    for (name, program) in config.tasks.iter() {
        let kind = match program.kind {
            ProgramKind::Action => "action",
            ProgramKind::Service => "service",
        };
        println!("  - {name} ({kind})");
        println!("      command: {}", program.command);
        if !program.dependency.items.is_empty() {
            println!(
                "      depends ({:?}): {:?}",
                program.dependency.mode, program.dependency.items
            );
        }
        if !program.state.log.is_empty() {
            println!("      log states: {:?}", program.state.log);
        }
        if let Some(ref file) = program.state.file {
            println!(
                "      file states ({}): {:?}",
                file.path.display(),
                file.states
            );
        }
        if !program.monitor_log {
            println!("      monitor_log: false");
        }
    }

    if let Some(ref criteria) = config.success_criteria {
        println!();
        println!(
            "success criteria ({:?}): {:?}",
            criteria.mode, criteria.items
        );
    }
}
