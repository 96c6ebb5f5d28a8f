// src/tail/file.rs

use std::path::Path;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::runtime::EngineEvent;
use crate::graph::programs::{FileStateSpec, ProgramId};
use crate::state::StateId;

/// How often the follower re-checks the file when no notify event woke it.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Follow a state file that may not exist yet.
///
/// The follower waits for the path to appear, then reads it from the
/// beginning and keeps matching appended `\n`-terminated lines against the
/// configured patterns, each firing at most once. A notify watcher on the
/// parent directory serves as a wake-up hint; the poll tick is the
/// correctness backstop, so missed filesystem events cost latency only.
///
/// The task ends when every pattern has fired or `cancel` fires; on
/// cancellation it drains whatever is already on disk first.
pub fn spawn_file_follower(
    program: ProgramId,
    program_name: String,
    spec: FileStateSpec,
    engine_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut remaining = spec.states;
        if remaining.is_empty() {
            return;
        }

        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();
        let _watcher = start_parent_watcher(&spec.path, wake_tx);

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Wait for the file to appear. Never appearing is not an error.
        let file = loop {
            match tokio::fs::File::open(&spec.path).await {
                Ok(f) => break f,
                Err(_) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(program = %program_name, path = ?spec.path,
                                "follower cancelled before the file appeared");
                            return;
                        }
                        _ = interval.tick() => {}
                        _ = wake_rx.recv() => {}
                    }
                }
            }
        };
        debug!(program = %program_name, path = ?spec.path, "following state file");

        let mut reader = BufReader::new(file);
        // Partial line carried across reads until its newline arrives.
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk: Vec<u8> = Vec::new();

        loop {
            chunk.clear();
            match reader.read_until(b'\n', &mut chunk).await {
                Ok(0) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            drain(
                                &mut reader,
                                &mut pending,
                                &mut remaining,
                                program,
                                &engine_tx,
                            )
                            .await;
                            return;
                        }
                        _ = interval.tick() => {}
                        _ = wake_rx.recv() => {}
                    }
                }
                Ok(_) => {
                    pending.extend_from_slice(&chunk);
                    if pending.ends_with(b"\n") {
                        if !match_line(&pending, &mut remaining, program, &engine_tx).await {
                            return;
                        }
                        pending.clear();
                        if remaining.is_empty() {
                            debug!(program = %program_name, "all file states fired");
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        program = %program_name,
                        path = ?spec.path,
                        error = %err,
                        "state file read error; follower stopping"
                    );
                    return;
                }
            }
        }
    })
}

/// One last pass over content already on disk, so matches written just
/// before shutdown are still recorded.
async fn drain(
    reader: &mut BufReader<tokio::fs::File>,
    pending: &mut Vec<u8>,
    remaining: &mut Vec<(StateId, String)>,
    program: ProgramId,
    engine_tx: &mpsc::Sender<EngineEvent>,
) {
    let mut chunk: Vec<u8> = Vec::new();
    loop {
        if remaining.is_empty() {
            return;
        }
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => break,
            Ok(_) => {
                pending.extend_from_slice(&chunk);
                if pending.ends_with(b"\n") {
                    if !match_line(pending, remaining, program, engine_tx).await {
                        return;
                    }
                    pending.clear();
                }
            }
            Err(_) => return,
        }
    }
    // A final unterminated fragment still counts during the drain.
    if !pending.is_empty() {
        let line = std::mem::take(pending);
        let _ = match_line(&line, remaining, program, engine_tx).await;
    }
}

/// Returns false when the engine side is gone.
async fn match_line(
    line: &[u8],
    remaining: &mut Vec<(StateId, String)>,
    program: ProgramId,
    engine_tx: &mpsc::Sender<EngineEvent>,
) -> bool {
    let mut i = 0;
    while i < remaining.len() {
        if contains_subslice(line, remaining[i].1.as_bytes()) {
            let (state, _) = remaining.remove(i);
            if engine_tx
                .send(EngineEvent::PatternHit { program, state })
                .await
                .is_err()
            {
                return false;
            }
        } else {
            i += 1;
        }
    }
    true
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Watch the file's parent directory as a wake-up hint. Any failure here
/// just means the follower relies on its poll tick alone.
fn start_parent_watcher(
    path: &Path,
    wake_tx: mpsc::UnboundedSender<()>,
) -> Option<RecommendedWatcher> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() || !parent.is_dir() {
        return None;
    }
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = wake_tx.send(());
            }
        },
        notify::Config::default(),
    )
    .ok()?;
    watcher.watch(parent, RecursiveMode::NonRecursive).ok()?;
    Some(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn user(name: &str) -> StateId {
        StateId::User(name.to_string())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn follows_a_file_created_after_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.txt");
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let spec = FileStateSpec {
            path: path.clone(),
            states: vec![(user("halfway"), "50%".to_string())],
        };
        let handle = spawn_file_follower(ProgramId(0), "p".into(), spec, tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "progress 10%").unwrap();
            writeln!(f, "progress 50%").unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("follower timed out")
            .expect("channel closed");
        match event {
            EngineEvent::PatternHit { state, .. } => assert_eq!(state, user("halfway")),
            other => panic!("unexpected event {other:?}"),
        }

        // All patterns fired, so the task ends on its own.
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("follower did not exit")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_drains_content_already_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let spec = FileStateSpec {
            path: path.clone(),
            states: vec![(user("done"), "all done".to_string())],
        };
        let handle = spawn_file_follower(ProgramId(0), "p".into(), spec, tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        std::fs::write(&path, "all done\n").unwrap();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("follower did not exit")
            .unwrap();

        let mut hit = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, EngineEvent::PatternHit { ref state, .. } if *state == user("done")) {
                hit = true;
            }
        }
        assert!(hit, "pattern written before cancellation was not drained");
    }
}
