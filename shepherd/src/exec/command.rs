// src/exec/command.rs

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::runtime::EngineEvent;
use crate::fsm::ExitDisposition;
use crate::graph::programs::{ProgramId, ProgramSpec};
use crate::tail::{spawn_file_follower, spawn_stream_scanner};

/// How long to wait for the stream scanners to drain after the child has
/// exited, so late pattern matches are delivered before the exit is
/// classified. Descendants holding the pipes open past this point only
/// lose their tee.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the executor needs to launch and mind one program.
#[derive(Debug)]
pub struct LaunchRequest {
    pub program: ProgramId,
    pub spec: ProgramSpec,
    pub work_dir: PathBuf,
    pub grace_period: Duration,
    /// Fired by the runtime when a graceful stop is issued.
    pub stop_rx: oneshot::Receiver<()>,
    /// Graph-lifetime token bounding the file follower.
    pub cancel: CancellationToken,
}

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<LaunchRequest>` is what the runtime uses to
/// dispatch programs whose dependencies are satisfied. Each launch runs in
/// its own Tokio task, so programs execute in parallel.
pub fn spawn_executor(engine_tx: mpsc::Sender<EngineEvent>) -> mpsc::Sender<LaunchRequest> {
    let (tx, mut rx) = mpsc::channel::<LaunchRequest>(32);

    tokio::spawn(async move {
        debug!("executor loop started");
        while let Some(request) = rx.recv().await {
            let engine_tx = engine_tx.clone();
            tokio::spawn(async move {
                run_program(request, engine_tx).await;
            });
        }
        debug!("executor loop finished (channel closed)");
    });

    tx
}

/// Launch one program, wire up its tailers, and report how it ended.
///
/// Exactly one of `SpawnFailed` or (`Spawned` followed by `Exited`) is
/// emitted per launch, and the child is always reaped before `Exited` goes
/// out.
async fn run_program(mut request: LaunchRequest, engine_tx: mpsc::Sender<EngineEvent>) {
    let spec = request.spec.clone();

    // A stop can already be pending if shutdown began while this request
    // was queued; in that case the child is never spawned.
    if request.stop_rx.try_recv().is_ok() {
        debug!(program = %spec.name, "stop pending before spawn; not launching");
        let _ = engine_tx
            .send(EngineEvent::Exited {
                program: request.program,
                disposition: ExitDisposition {
                    code: None,
                    signal: None,
                },
            })
            .await;
        return;
    }

    info!(program = %spec.name, command = %spec.command, "starting program");

    let (stdout_log, stderr_log) =
        match open_logs(&spec.stdout_path, &spec.stderr_path).await {
            Ok(files) => files,
            Err(err) => {
                warn!(program = %spec.name, error = %err, "could not open log files");
                let _ = engine_tx
                    .send(EngineEvent::SpawnFailed {
                        program: request.program,
                        error: err.to_string(),
                    })
                    .await;
                return;
            }
        };

    let mut cmd = build_command(&spec.command);
    cmd.current_dir(&request.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so stop signals fan out to descendants.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %spec.name, error = %err, "failed to spawn");
            let _ = engine_tx
                .send(EngineEvent::SpawnFailed {
                    program: request.program,
                    error: err.to_string(),
                })
                .await;
            return;
        }
    };

    // Enqueued before the scanners exist, so `started` always precedes
    // this program's pattern hits.
    let _ = engine_tx
        .send(EngineEvent::Spawned {
            program: request.program,
        })
        .await;

    let patterns = if spec.monitor_log {
        spec.log_states.clone()
    } else {
        Vec::new()
    };

    let mut scanners = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        scanners.push(spawn_stream_scanner(
            request.program,
            spec.name.clone(),
            stdout,
            stdout_log,
            patterns.clone(),
            engine_tx.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        scanners.push(spawn_stream_scanner(
            request.program,
            spec.name.clone(),
            stderr,
            stderr_log,
            patterns,
            engine_tx.clone(),
        ));
    }

    if let Some(file_spec) = spec.file_states.clone() {
        spawn_file_follower(
            request.program,
            spec.name.clone(),
            file_spec,
            engine_tx.clone(),
            request.cancel.clone(),
        );
    }

    let disposition = supervise(
        &mut child,
        request.stop_rx,
        request.grace_period,
        &spec.name,
    )
    .await;

    for scanner in scanners {
        let _ = tokio::time::timeout(STREAM_DRAIN_TIMEOUT, scanner).await;
    }

    info!(
        program = %spec.name,
        code = ?disposition.code,
        signal = ?disposition.signal,
        "program exited"
    );
    let _ = engine_tx
        .send(EngineEvent::Exited {
            program: request.program,
            disposition,
        })
        .await;
}

/// Wait for the child to exit, or deliver the graceful-stop protocol:
/// SIGTERM to the process group, a grace period, then SIGKILL.
async fn supervise(
    child: &mut Child,
    stop_rx: oneshot::Receiver<()>,
    grace_period: Duration,
    name: &str,
) -> ExitDisposition {
    tokio::select! {
        status = child.wait() => disposition_of(status),
        _ = stop_rx => {
            debug!(program = %name, "delivering graceful stop");
            terminate_group(child, name);

            match tokio::time::timeout(grace_period, child.wait()).await {
                Ok(status) => disposition_of(status),
                Err(_) => {
                    warn!(program = %name, "grace period exceeded; sending SIGKILL");
                    kill_group(child, name);
                    disposition_of(child.wait().await)
                }
            }
        }
    }
}

fn disposition_of(status: std::io::Result<std::process::ExitStatus>) -> ExitDisposition {
    match status {
        Ok(status) => {
            #[cfg(unix)]
            let signal = std::os::unix::process::ExitStatusExt::signal(&status);
            #[cfg(not(unix))]
            let signal = None;
            ExitDisposition {
                code: status.code(),
                signal,
            }
        }
        Err(_) => ExitDisposition {
            code: None,
            signal: None,
        },
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal, name: &str) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(err) = killpg(Pid::from_raw(pid as i32), signal) {
            debug!(program = %name, error = %err, "process group signal failed");
        }
    }
}

fn terminate_group(child: &mut Child, name: &str) {
    #[cfg(unix)]
    signal_group(child, nix::sys::signal::Signal::SIGTERM, name);
    #[cfg(not(unix))]
    {
        let _ = name;
        let _ = child.start_kill();
    }
}

fn kill_group(child: &mut Child, name: &str) {
    #[cfg(unix)]
    signal_group(child, nix::sys::signal::Signal::SIGKILL, name);
    #[cfg(not(unix))]
    {
        let _ = name;
        let _ = child.start_kill();
    }
}

/// Build the child command.
///
/// Commands with shell syntax run under `sh -c`; a plain argv-style line is
/// executed directly so spawn errors (ENOENT, EACCES) surface at spawn time
/// instead of as a shell exit code.
fn build_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        return cmd;
    }

    if needs_shell(command) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        return cmd;
    }

    let mut parts = command.split_whitespace();
    let program = parts.next().unwrap_or_default();
    let mut cmd = Command::new(program);
    cmd.args(parts);
    cmd
}

fn needs_shell(command: &str) -> bool {
    command
        .chars()
        .any(|c| "|&;<>()$`\\\"'*?[]#~{}\n".contains(c))
}

async fn open_logs(
    stdout_path: &Path,
    stderr_path: &Path,
) -> Result<(tokio::fs::File, tokio::fs::File)> {
    Ok((open_append(stdout_path).await?, open_append(stderr_path).await?))
}

async fn open_append(path: &Path) -> Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating log directory {:?}", parent))?;
        }
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening log file {:?}", path))
}
