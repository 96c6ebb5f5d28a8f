//! End-to-end scenarios running real child processes under the full
//! runtime: FSMs, scheduler, supervisor, tailers and arbiter together.

use std::path::Path;
use std::time::Duration;

use shepherd::config::{validate_config, ConfigFile, PredicateMode};
use shepherd::engine::{Criteria, Disposition, GraphReport, Runtime, RuntimeOptions};
use shepherd::graph::ProgramArena;
use shepherd::report::write_state_times;
use shepherd::state::{BuiltinState, StateId, StateTimes};
use shepherd_test_utils::{ConfigFileBuilder, ProgramConfigBuilder};

fn runtime_for(config: &ConfigFile, work_dir: &Path) -> Runtime {
    validate_config(config).expect("test config must be valid");
    let arena = ProgramArena::from_config(config);
    let criteria = Criteria::from_config(config, &arena);
    let options = RuntimeOptions {
        work_dir: work_dir.to_path_buf(),
        grace_period: Duration::from_secs_f64(config.process_timeout),
        stop_signal: config.stop_signal.clone(),
        max_run_time: config.max_run_time.map(Duration::from_secs_f64),
        handle_os_signals: false,
    };
    Runtime::new(arena, criteria, options)
}

async fn run_graph(config: &ConfigFile, work_dir: &Path) -> GraphReport {
    let runtime = runtime_for(config, work_dir);
    tokio::time::timeout(Duration::from_secs(30), runtime.run())
        .await
        .expect("graph did not terminate in time")
        .expect("runtime failed")
}

fn times_of<'r>(report: &'r GraphReport, name: &str) -> &'r StateTimes {
    report
        .state_times
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, t)| t)
        .unwrap_or_else(|| panic!("no state times for program {name}"))
}

fn builtin(state: BuiltinState) -> StateId {
    StateId::Builtin(state)
}

fn user(state: &str) -> StateId {
    StateId::User(state.to_string())
}

/// Invariants every program must satisfy: timestamps are monotonically
/// non-decreasing, `final` is present and last, and exactly one terminal
/// classification was recorded.
fn assert_well_formed(report: &GraphReport) {
    for (name, times) in &report.state_times {
        let entries: Vec<(&StateId, f64)> = times.iter().collect();
        assert!(
            entries.windows(2).all(|w| w[0].1 <= w[1].1),
            "{name}: state times are not monotonic: {entries:?}"
        );
        assert!(
            times.contains(&builtin(BuiltinState::Initialized)),
            "{name}: missing initialized"
        );
        let (last_state, _) = entries.last().expect("at least one entry");
        assert_eq!(
            **last_state,
            builtin(BuiltinState::Final),
            "{name}: final is not the last entry"
        );
        let terminals = [
            BuiltinState::ActionSuccess,
            BuiltinState::ActionFailure,
            BuiltinState::ServiceFailure,
            BuiltinState::Stopped,
        ];
        let classified = terminals
            .iter()
            .filter(|t| times.contains(&builtin(**t)))
            .count();
        assert_eq!(classified, 1, "{name}: expected exactly one terminal state");
    }
}

fn program(dir: &Path, name: &str, command: &str) -> ProgramConfigBuilder {
    ProgramConfigBuilder::new(command)
        .stdout_path(dir.join(format!("{name}_stdout.log")))
        .stderr_path(dir.join(format!("{name}_stderr.log")))
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_action_chain() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program("p1", program(dir.path(), "p1", "echo done").build())
        .with_program(
            "p2",
            program(dir.path(), "p2", "echo done")
                .depends_on("p1", "action_success")
                .build(),
        )
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Success);

    let p1 = times_of(&report, "p1");
    let p2 = times_of(&report, "p2");
    assert!(p1.contains(&builtin(BuiltinState::ActionSuccess)));
    assert!(p2.contains(&builtin(BuiltinState::ActionSuccess)));

    let p1_final = p1.get(&builtin(BuiltinState::Final)).unwrap();
    let p2_started = p2.get(&builtin(BuiltinState::Started)).unwrap();
    assert!(
        p1_final <= p2_started,
        "p2 started ({p2_started}) before p1 finished ({p1_final})"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_state_gates_a_dependent_action() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "svc",
            program(
                dir.path(),
                "svc",
                "echo starting; echo Service is ready; sleep 60",
            )
            .service()
            .log_state("ready", "Service is ready")
            .build(),
        )
        .with_program(
            "act",
            program(dir.path(), "act", "echo ok")
                .depends_on("svc", "ready")
                .build(),
        )
        .max_run_time(2.0)
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Timeout);

    let svc = times_of(&report, "svc");
    let act = times_of(&report, "act");

    let ready = svc.get(&user("ready")).expect("svc never reached ready");
    let act_started = act
        .get(&builtin(BuiltinState::Started))
        .expect("act never started");
    assert!(ready <= act_started);
    assert!(act.contains(&builtin(BuiltinState::ActionSuccess)));
    assert!(svc.contains(&builtin(BuiltinState::Stopped)));
    assert!(svc.get(&builtin(BuiltinState::Stopped)).unwrap() >= 2.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn any_mode_releases_on_the_surviving_peer() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program("a", program(dir.path(), "a", "true").build())
        .with_program("b", program(dir.path(), "b", "false").build())
        .with_program(
            "c",
            program(dir.path(), "c", "echo go")
                .dep_mode(PredicateMode::Any)
                .depends_on("a", "action_success")
                .depends_on("b", "action_success")
                .build(),
        )
        .success_criteria(PredicateMode::All, &[("c", "action_success")])
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);

    let b = times_of(&report, "b");
    let c = times_of(&report, "c");
    assert!(b.contains(&builtin(BuiltinState::ActionFailure)));
    assert!(c.contains(&builtin(BuiltinState::ActionSuccess)));

    // b's failure is masked by the criteria naming only c.
    assert_eq!(report.disposition, Disposition::Success);
    assert_eq!(report.disposition.exit_code(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_file_shuts_the_graph_down() {
    let dir = tempfile::tempdir().unwrap();
    let stop_path = dir.path().join("stop.txt");
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "svc",
            program(dir.path(), "svc", "sleep 60").service().build(),
        )
        .stop_signal(&stop_path)
        .build();

    let touch = {
        let stop_path = stop_path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            std::fs::write(&stop_path, "").expect("touch stop file");
        })
    };

    let report = run_graph(&config, dir.path()).await;
    touch.await.unwrap();

    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Signalled);
    assert_eq!(report.disposition.exit_code(), 0);

    let svc = times_of(&report, "svc");
    assert!(svc.contains(&builtin(BuiltinState::Stopped)));
    // The stop file is left in place.
    assert!(stop_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn max_run_time_stops_a_lingering_service() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "svc",
            program(dir.path(), "svc", "tail -f /dev/null").service().build(),
        )
        .max_run_time(0.5)
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Timeout);
    assert_eq!(report.disposition.exit_code(), 0);
    assert!(times_of(&report, "svc").contains(&builtin(BuiltinState::Stopped)));
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_skips_started_and_fails_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program("bad", program(dir.path(), "bad", "/no/such/bin").build())
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Failure);
    assert_eq!(report.disposition.exit_code(), 1);

    let bad = times_of(&report, "bad");
    assert!(bad.contains(&builtin(BuiltinState::ActionFailure)));
    assert!(!bad.contains(&builtin(BuiltinState::Started)));
    assert!(bad.contains(&builtin(BuiltinState::Final)));
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_does_not_sink_other_programs() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program("bad", program(dir.path(), "bad", "/no/such/bin").build())
        .with_program("good", program(dir.path(), "good", "echo fine").build())
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert!(times_of(&report, "good").contains(&builtin(BuiltinState::ActionSuccess)));
    // The unmasked failure still decides the overall disposition.
    assert_eq!(report.disposition, Disposition::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_file_present_before_anything_starts() {
    let dir = tempfile::tempdir().unwrap();
    let stop_path = dir.path().join("stop.txt");
    std::fs::write(&stop_path, "").unwrap();

    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "svc",
            program(dir.path(), "svc", "sleep 60")
                .service()
                .log_state("ready", "never printed")
                .build(),
        )
        .with_program(
            "blocked",
            program(dir.path(), "blocked", "echo hi")
                .depends_on("svc", "ready")
                .build(),
        )
        .stop_signal(&stop_path)
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Signalled);

    // The gated program never started; it still reached final via stopped.
    let blocked = times_of(&report, "blocked");
    assert!(!blocked.contains(&builtin(BuiltinState::Started)));
    assert!(blocked.contains(&builtin(BuiltinState::Stopped)));
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_pattern_does_not_block_termination() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "chatty",
            program(dir.path(), "chatty", "echo done")
                .log_state("magic", "never printed")
                .build(),
        )
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Success);

    let chatty = times_of(&report, "chatty");
    assert!(!chatty.contains(&user("magic")));
    assert!(chatty.contains(&builtin(BuiltinState::ActionSuccess)));
}

#[tokio::test(flavor = "multi_thread")]
async fn file_state_gates_a_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker.txt");
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "writer",
            program(
                dir.path(),
                "writer",
                "sleep 0.3; echo checkpoint reached > marker.txt; sleep 60",
            )
            .service()
            .file_states(&marker, &[("checkpoint", "checkpoint reached")])
            .build(),
        )
        .with_program(
            "reader",
            program(dir.path(), "reader", "echo saw it")
                .depends_on("writer", "checkpoint")
                .build(),
        )
        .max_run_time(3.0)
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);

    let writer = times_of(&report, "writer");
    let reader = times_of(&report, "reader");
    let checkpoint = writer
        .get(&user("checkpoint"))
        .expect("file state never fired");
    let reader_started = reader
        .get(&builtin(BuiltinState::Started))
        .expect("reader never started");
    assert!(checkpoint <= reader_started);
    assert!(reader.contains(&builtin(BuiltinState::ActionSuccess)));
}

#[tokio::test(flavor = "multi_thread")]
async fn monitor_log_false_ignores_stdout_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "quiet",
            program(dir.path(), "quiet", "echo the magic words")
                .monitor_log(false)
                .log_state("magic", "magic words")
                .build(),
        )
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert!(!times_of(&report, "quiet").contains(&user("magic")));
}

#[tokio::test(flavor = "multi_thread")]
async fn stderr_is_scanned_like_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program(
            "grumbler",
            program(dir.path(), "grumbler", "echo warming up 1>&2; sleep 0.2")
                .log_state("warm", "warming up")
                .build(),
        )
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert!(times_of(&report, "grumbler").contains(&user("warm")));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_graph_completes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("state_times.json");
    let config = ConfigFileBuilder::new(&artifact).build();

    let report = run_graph(&config, dir.path()).await;
    assert_eq!(report.disposition, Disposition::Success);
    assert!(report.state_times.is_empty());

    write_state_times(&artifact, &report.state_times).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(parsed, serde_json::json!({}));
}

#[tokio::test(flavor = "multi_thread")]
async fn dependency_watermark_precedes_dependent_start() {
    // Diamond: root fans out to two echoes, join waits for both.
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigFileBuilder::new(dir.path().join("state_times.json"))
        .with_program("root", program(dir.path(), "root", "echo r").build())
        .with_program(
            "left",
            program(dir.path(), "left", "echo l")
                .depends_on("root", "action_success")
                .build(),
        )
        .with_program(
            "right",
            program(dir.path(), "right", "echo r2")
                .depends_on("root", "action_success")
                .build(),
        )
        .with_program(
            "join",
            program(dir.path(), "join", "echo j")
                .depends_on("left", "action_success")
                .depends_on("right", "action_success")
                .build(),
        )
        .build();

    let report = run_graph(&config, dir.path()).await;
    assert_well_formed(&report);
    assert_eq!(report.disposition, Disposition::Success);

    for (dependent, dep) in [
        ("left", "root"),
        ("right", "root"),
        ("join", "left"),
        ("join", "right"),
    ] {
        let reached = times_of(&report, dep)
            .get(&builtin(BuiltinState::ActionSuccess))
            .unwrap();
        let started = times_of(&report, dependent)
            .get(&builtin(BuiltinState::Started))
            .unwrap();
        assert!(
            reached <= started,
            "{dependent} started at {started} before {dep} reached its watermark at {reached}"
        );
    }
}
