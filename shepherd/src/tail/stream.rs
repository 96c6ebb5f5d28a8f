// src/tail/stream.rs

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::runtime::EngineEvent;
use crate::graph::programs::ProgramId;
use crate::state::StateId;

/// Tail one of the child's standard streams: append every byte to its log
/// file and match the configured patterns line by line.
///
/// Matching is a case-sensitive substring test over the raw bytes of each
/// `\n`-terminated line (a trailing unterminated fragment at EOF is matched
/// too). Each state fires at most once; once every pattern has fired the
/// scanner keeps draining the stream into the log file.
///
/// A read error ends this scanner only — the program itself is unaffected.
/// A write error to the log file stops the tee but scanning continues.
pub fn spawn_stream_scanner(
    program: ProgramId,
    program_name: String,
    stream: impl AsyncRead + Unpin + Send + 'static,
    log_file: tokio::fs::File,
    patterns: Vec<(StateId, String)>,
    engine_tx: mpsc::Sender<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut writer = Some(log_file);
        let mut remaining = patterns;
        let mut line: Vec<u8> = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        program = %program_name,
                        error = %err,
                        "stream read error; scanner stopping"
                    );
                    break;
                }
            }

            if let Some(file) = writer.as_mut() {
                if let Err(err) = file.write_all(&line).await {
                    warn!(
                        program = %program_name,
                        error = %err,
                        "log write failed; continuing to scan without the tee"
                    );
                    writer = None;
                }
            }

            let mut i = 0;
            while i < remaining.len() {
                if contains_subslice(&line, remaining[i].1.as_bytes()) {
                    let (state, _) = remaining.remove(i);
                    debug!(program = %program_name, state = %state, "pattern matched");
                    if engine_tx
                        .send(EngineEvent::PatternHit { program, state })
                        .await
                        .is_err()
                    {
                        return;
                    }
                } else {
                    i += 1;
                }
            }
        }

        if let Some(mut file) = writer {
            let _ = file.flush().await;
        }
        debug!(program = %program_name, "stream scanner ended");
    })
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    fn user(name: &str) -> StateId {
        StateId::User(name.to_string())
    }

    async fn temp_log() -> (tempfile::TempDir, tokio::fs::File, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stream.log");
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .expect("open log");
        (dir, file, path)
    }

    #[tokio::test]
    async fn matches_fire_once_in_stream_order() {
        let (duplex_tx, duplex_rx) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::channel(16);
        let (_dir, file, path) = temp_log().await;

        let handle = spawn_stream_scanner(
            ProgramId(0),
            "p".to_string(),
            duplex_rx,
            file,
            vec![
                (user("ready"), "is ready".to_string()),
                (user("warmed"), "warm".to_string()),
            ],
            tx,
        );

        let mut w = duplex_tx;
        w.write_all(b"booting\nService is ready now\ncache warm\nis ready again\n")
            .await
            .unwrap();
        drop(w);
        handle.await.unwrap();

        let mut states = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                EngineEvent::PatternHit { state, .. } => states.push(state),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(states, vec![user("ready"), user("warmed")]);

        let logged = std::fs::read_to_string(&path).unwrap();
        assert!(logged.contains("booting\n"));
        assert!(logged.contains("is ready again\n"));
    }

    #[tokio::test]
    async fn empty_pattern_set_is_a_pure_tee() {
        let (duplex_tx, duplex_rx) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(4);
        let (_dir, file, path) = temp_log().await;

        let handle = spawn_stream_scanner(
            ProgramId(0),
            "p".to_string(),
            duplex_rx,
            file,
            Vec::new(),
            tx,
        );

        let mut w = duplex_tx;
        w.write_all(b"anything goes\n").await.unwrap();
        drop(w);
        handle.await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "anything goes\n");
    }

    #[test]
    fn subslice_matching_is_case_sensitive() {
        assert!(contains_subslice(b"Service is ready", b"is ready"));
        assert!(!contains_subslice(b"Service is READY", b"is ready"));
        assert!(!contains_subslice(b"short", b"much longer needle"));
    }
}
