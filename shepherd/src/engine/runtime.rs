// src/engine/runtime.rs

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::engine::arbiter::{
    Criteria, spawn_max_run_time_timer, spawn_signal_listener, spawn_stop_file_poller,
};
use crate::exec::{spawn_executor, LaunchRequest};
use crate::fsm::{ExitDisposition, ProgramFsm};
use crate::graph::programs::{ProgramArena, ProgramId};
use crate::graph::scheduler::DepScheduler;
use crate::state::{BuiltinState, StateId, StateTimes};

/// Why shutdown was initiated. The first trigger wins; later ones are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    StopFile,
    MaxRunTime,
    Signal,
    Criteria,
}

/// Events sent into the runtime loop by the tailers, the executor and the
/// arbiter triggers.
#[derive(Debug)]
pub enum EngineEvent {
    PatternHit {
        program: ProgramId,
        state: StateId,
    },
    Spawned {
        program: ProgramId,
    },
    SpawnFailed {
        program: ProgramId,
        error: String,
    },
    Exited {
        program: ProgramId,
        disposition: ExitDisposition,
    },
    ShutdownRequested {
        cause: ShutdownCause,
    },
}

/// Overall graph disposition after shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Timeout,
    Signalled,
    Failure,
}

impl Disposition {
    /// Process exit code: clean completion is 0, unmasked failure is 1.
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::Failure => 1,
            _ => 0,
        }
    }
}

/// What the runtime hands back once every program is final.
#[derive(Debug, Clone)]
pub struct GraphReport {
    pub disposition: Disposition,
    /// State times per program, in arena order.
    pub state_times: Vec<(String, StateTimes)>,
}

/// Options that shape one graph run.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub work_dir: PathBuf,
    pub grace_period: Duration,
    pub stop_signal: Option<PathBuf>,
    pub max_run_time: Option<Duration>,
    /// Whether to react to SIGINT/SIGTERM on the shepherd process. Off in
    /// embedded/test use.
    pub handle_os_signals: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            grace_period: Duration::from_secs(10),
            stop_signal: None,
            max_run_time: None,
            handle_os_signals: true,
        }
    }
}

/// The graph controller.
///
/// Owns the clock origin, every program's FSM, the dependency scheduler
/// and the shutdown protocol. All state mutation happens inside the
/// event loop in [`Runtime::run`]; tailers, executor and arbiter tasks
/// only ever send events.
pub struct Runtime {
    arena: ProgramArena,
    options: RuntimeOptions,
    criteria: Option<Criteria>,

    fsms: Vec<ProgramFsm>,
    launched: Vec<bool>,
    stop_txs: Vec<Option<oneshot::Sender<()>>>,

    origin: Instant,
    shutdown: Option<ShutdownCause>,
}

impl Runtime {
    pub fn new(arena: ProgramArena, criteria: Option<Criteria>, options: RuntimeOptions) -> Self {
        let len = arena.len();
        Self {
            arena,
            options,
            criteria,
            fsms: Vec::with_capacity(len),
            launched: vec![false; len],
            stop_txs: (0..len).map(|_| None).collect(),
            origin: Instant::now(),
            shutdown: None,
        }
    }

    /// Build a runtime straight from a merged, preprocessed, validated
    /// config.
    pub fn from_config(config: &ConfigFile, work_dir: PathBuf) -> Self {
        let arena = ProgramArena::from_config(config);
        let criteria = Criteria::from_config(config, &arena);
        let options = RuntimeOptions {
            work_dir,
            grace_period: Duration::from_secs_f64(config.process_timeout),
            stop_signal: config.stop_signal.clone(),
            max_run_time: config.max_run_time.map(Duration::from_secs_f64),
            handle_os_signals: true,
        };
        Self::new(arena, criteria, options)
    }

    /// Seconds since the clock origin.
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn all_final(&self) -> bool {
        self.fsms.iter().all(|fsm| fsm.is_final())
    }

    /// Run the graph to completion and report the outcome.
    pub async fn run(mut self) -> Result<GraphReport> {
        info!(programs = self.arena.len(), "shepherd runtime started");

        // Clock origin: every program records `initialized` at ~0.
        self.origin = Instant::now();
        let t0 = self.now();
        for spec in self.arena.iter() {
            self.fsms.push(ProgramFsm::new(&spec.name, spec.kind, t0));
        }

        let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(64);
        let cancel = CancellationToken::new();
        let exec_tx = spawn_executor(engine_tx.clone());

        if let Some(path) = self.options.stop_signal.clone() {
            spawn_stop_file_poller(path, engine_tx.clone(), cancel.child_token());
        }
        if let Some(limit) = self.options.max_run_time {
            spawn_max_run_time_timer(limit, engine_tx.clone(), cancel.child_token());
        }
        if self.options.handle_os_signals {
            spawn_signal_listener(engine_tx.clone(), cancel.child_token());
        }

        let mut scheduler = DepScheduler::new(&self.arena);

        if !self.all_final() {
            // Programs with no dependencies are eligible immediately, and
            // `initialized` is itself a watermark peers may depend on.
            let mut ready = scheduler.initial_ready();
            for id in self.arena.ids() {
                ready.extend(
                    scheduler.record_state(id, &StateId::Builtin(BuiltinState::Initialized)),
                );
            }
            for id in ready {
                self.launch(id, &exec_tx, &cancel).await?;
            }
            // Criteria over `initialized` watermarks can already be true.
            self.check_criteria(&mut scheduler);

            while !self.all_final() {
                let event = match engine_rx.recv().await {
                    Some(event) => event,
                    None => break,
                };
                debug!(?event, "runtime received event");
                self.handle_event(event, &mut scheduler, &exec_tx, &cancel)
                    .await?;
            }
        } else {
            info!("no programs configured; nothing to run");
        }

        cancel.cancel();

        let disposition = self.disposition();
        info!(?disposition, "shepherd runtime exiting");

        let state_times = self
            .arena
            .iter()
            .map(|spec| (spec.name.clone(), self.fsms[spec.id.0].times().clone()))
            .collect();

        Ok(GraphReport {
            disposition,
            state_times,
        })
    }

    async fn handle_event(
        &mut self,
        event: EngineEvent,
        scheduler: &mut DepScheduler,
        exec_tx: &mpsc::Sender<LaunchRequest>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match event {
            EngineEvent::Spawned { program } => {
                let t = self.now();
                let entered = self.fsms[program.0].on_spawned(t);
                self.propagate(program, entered, scheduler, exec_tx, cancel)
                    .await
            }
            EngineEvent::PatternHit { program, state } => {
                let t = self.now();
                let entered = self.fsms[program.0].on_pattern(state, t);
                self.propagate(program, entered, scheduler, exec_tx, cancel)
                    .await
            }
            EngineEvent::SpawnFailed { program, error } => {
                warn!(
                    program = %self.arena.get(program).name,
                    error = %error,
                    "program failed to spawn"
                );
                let t = self.now();
                let entered = self.fsms[program.0].on_spawn_failed(t);
                self.propagate(program, entered, scheduler, exec_tx, cancel)
                    .await
            }
            EngineEvent::Exited {
                program,
                disposition,
            } => {
                let t = self.now();
                let entered = self.fsms[program.0].on_exit(disposition, t);
                self.propagate(program, entered, scheduler, exec_tx, cancel)
                    .await
            }
            EngineEvent::ShutdownRequested { cause } => {
                if self.shutdown.is_none() {
                    self.begin_shutdown(cause, scheduler);
                } else {
                    debug!(?cause, "shutdown already in progress; trigger ignored");
                }
                Ok(())
            }
        }
    }

    /// Feed newly reached watermarks to the scheduler and the success
    /// criteria. Releases are suppressed once shutdown has begun.
    async fn propagate(
        &mut self,
        program: ProgramId,
        entered: Vec<StateId>,
        scheduler: &mut DepScheduler,
        exec_tx: &mpsc::Sender<LaunchRequest>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for state in &entered {
            let ready = scheduler.record_state(program, state);
            if self.shutdown.is_none() {
                for id in ready {
                    if !self.launched[id.0] && !self.fsms[id.0].is_final() {
                        self.launch(id, exec_tx, cancel).await?;
                    }
                }
            }
        }
        if !entered.is_empty() && self.shutdown.is_none() {
            self.check_criteria(scheduler);
        }
        Ok(())
    }

    fn check_criteria(&mut self, scheduler: &mut DepScheduler) {
        let met = self
            .criteria
            .as_ref()
            .is_some_and(|criteria| criteria.satisfied(&self.fsms));
        if met && self.shutdown.is_none() {
            info!("success criteria satisfied");
            self.begin_shutdown(ShutdownCause::Criteria, scheduler);
        }
    }

    async fn launch(
        &mut self,
        id: ProgramId,
        exec_tx: &mpsc::Sender<LaunchRequest>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let spec = self.arena.get(id).clone();
        debug!(program = %spec.name, "dependencies satisfied; dispatching launch");

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_txs[id.0] = Some(stop_tx);
        self.launched[id.0] = true;

        exec_tx
            .send(LaunchRequest {
                program: id,
                spec,
                work_dir: self.options.work_dir.clone(),
                grace_period: self.options.grace_period,
                stop_rx,
                cancel: cancel.child_token(),
            })
            .await
            .map_err(|_| anyhow!("executor channel closed"))
    }

    /// Shutdown protocol: issue `stop_requested` to every non-final
    /// program, in arbitrary order. Programs that never spawned become
    /// `stopped` right away; the rest get the supervisor's SIGTERM →
    /// grace → SIGKILL treatment and finish via their `Exited` events.
    fn begin_shutdown(&mut self, cause: ShutdownCause, scheduler: &mut DepScheduler) {
        info!(?cause, "initiating graceful shutdown");
        self.shutdown = Some(cause);

        for id in self.arena.ids() {
            if self.fsms[id.0].is_final() {
                continue;
            }
            self.fsms[id.0].mark_stop_requested();
            if self.launched[id.0] {
                if let Some(stop_tx) = self.stop_txs[id.0].take() {
                    let _ = stop_tx.send(());
                }
            } else {
                let t = self.now();
                // Watermarks still propagate so the artifact is coherent;
                // no launches can result while shutdown is in progress.
                for state in self.fsms[id.0].finish_without_start(t) {
                    scheduler.record_state(id, &state);
                }
            }
        }
    }

    /// Overall disposition: unmasked failures dominate, then the shutdown
    /// cause decides between success, timeout and signalled.
    fn disposition(&self) -> Disposition {
        let criteria_met = matches!(self.shutdown, Some(ShutdownCause::Criteria))
            || self
                .criteria
                .as_ref()
                .is_some_and(|criteria| criteria.satisfied(&self.fsms));

        let any_failure = self.fsms.iter().any(|fsm| {
            fsm.reached(&BuiltinState::ActionFailure.into())
                || fsm.reached(&BuiltinState::ServiceFailure.into())
        });

        if any_failure && !criteria_met {
            return Disposition::Failure;
        }

        match self.shutdown {
            Some(ShutdownCause::MaxRunTime) => Disposition::Timeout,
            Some(ShutdownCause::StopFile) | Some(ShutdownCause::Signal) => Disposition::Signalled,
            Some(ShutdownCause::Criteria) | None => Disposition::Success,
        }
    }
}
