// src/engine/arbiter.rs

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::model::{ConfigFile, PredicateMode};
use crate::engine::runtime::{EngineEvent, ShutdownCause};
use crate::fsm::ProgramFsm;
use crate::graph::programs::{ProgramArena, ProgramId};
use crate::state::StateId;

/// How often the stop-signal file's existence is checked.
pub const STOP_FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll for the stop-signal file. Only its existence matters; the file is
/// left in place.
pub fn spawn_stop_file_poller(
    path: PathBuf,
    engine_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STOP_FILE_POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }
            match tokio::fs::try_exists(&path).await {
                Ok(true) => {
                    info!(path = ?path, "stop signal file detected");
                    let _ = engine_tx
                        .send(EngineEvent::ShutdownRequested {
                            cause: ShutdownCause::StopFile,
                        })
                        .await;
                    return;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(path = ?path, error = %err, "stop file check failed; still polling");
                }
            }
        }
    });
}

/// One-shot wall-clock limit measured from the clock origin.
pub fn spawn_max_run_time_timer(
    limit: Duration,
    engine_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                info!(limit = ?limit, "maximum run time reached");
                let _ = engine_tx
                    .send(EngineEvent::ShutdownRequested {
                        cause: ShutdownCause::MaxRunTime,
                    })
                    .await;
            }
        }
    });
}

/// SIGINT / SIGTERM on the shepherd process itself → graceful shutdown.
pub fn spawn_signal_listener(engine_tx: mpsc::Sender<EngineEvent>, cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    warn!(error = %err, "could not install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        info!("received shutdown signal");
        let _ = engine_tx
            .send(EngineEvent::ShutdownRequested {
                cause: ShutdownCause::Signal,
            })
            .await;
    });
}

/// The success-criteria predicate, resolved to arena indices.
///
/// Evaluated over watermarks on every state change: an item is met once the
/// program has reached-or-passed the required state.
#[derive(Debug, Clone)]
pub struct Criteria {
    mode: PredicateMode,
    items: Vec<(ProgramId, StateId)>,
}

impl Criteria {
    /// Resolve the config predicate against the arena, if one is set.
    pub fn from_config(config: &ConfigFile, arena: &ProgramArena) -> Option<Criteria> {
        let predicate = config.success_criteria.as_ref()?;
        let items = predicate
            .items
            .iter()
            .filter_map(|(name, state)| {
                arena.id_of(name).map(|id| (id, StateId::parse(state)))
            })
            .collect();
        Some(Criteria {
            mode: predicate.mode,
            items,
        })
    }

    pub fn satisfied(&self, fsms: &[ProgramFsm]) -> bool {
        let met = |&(id, ref state): &(ProgramId, StateId)| fsms[id.0].reached(state);
        match self.mode {
            PredicateMode::All => !self.items.is_empty() && self.items.iter().all(met),
            PredicateMode::Any => self.items.iter().any(met),
        }
    }
}
