use shepherd::config::{validate_config, PredicateMode};
use shepherd_test_utils::{ConfigFileBuilder, ProgramConfigBuilder};

fn assert_rejected(config: shepherd::config::ConfigFile, needle: &str) {
    let err = validate_config(&config).expect_err("config must be rejected");
    let message = err.to_string();
    assert!(
        message.contains(needle),
        "error {message:?} does not mention {needle:?}"
    );
}

#[test]
fn dependency_cycles_are_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a").depends_on("b", "final").build(),
        )
        .with_program(
            "b",
            ProgramConfigBuilder::new("echo b").depends_on("a", "final").build(),
        )
        .build();
    assert_rejected(config, "cycle");
}

#[test]
fn self_dependency_is_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .depends_on("a", "started")
                .build(),
        )
        .build();
    assert_rejected(config, "cannot depend on itself");
}

#[test]
fn unknown_peer_is_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .depends_on("ghost", "started")
                .build(),
        )
        .build();
    assert_rejected(config, "unknown program 'ghost'");
}

#[test]
fn unreachable_dependency_state_is_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program("a", ProgramConfigBuilder::new("echo a").build())
        .with_program(
            "b",
            ProgramConfigBuilder::new("echo b")
                .depends_on("a", "warmed_up")
                .build(),
        )
        .build();
    assert_rejected(config, "can never reach 'warmed_up'");
}

#[test]
fn declared_user_states_are_reachable_dependency_targets() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .log_state("warmed_up", "warm")
                .build(),
        )
        .with_program(
            "b",
            ProgramConfigBuilder::new("echo b")
                .depends_on("a", "warmed_up")
                .build(),
        )
        .build();
    assert!(validate_config(&config).is_ok());
}

#[test]
fn reserved_state_names_are_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .log_state("action_success", "done")
                .build(),
        )
        .build();
    assert_rejected(config, "reserved state name");
}

#[test]
fn duplicate_user_state_across_log_and_file_is_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .log_state("ready", "ready on stdout")
                .file_states("progress.txt", &[("ready", "ready in file")])
                .build(),
        )
        .build();
    assert_rejected(config, "more than once");
}

#[test]
fn file_section_without_states_is_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .file_states("progress.txt", &[])
                .build(),
        )
        .build();
    assert_rejected(config, "no state.file.states");
}

#[test]
fn duplicate_log_paths_are_rejected() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program(
            "a",
            ProgramConfigBuilder::new("echo a")
                .stdout_path("shared.log")
                .stderr_path("a_err.log")
                .build(),
        )
        .with_program(
            "b",
            ProgramConfigBuilder::new("echo b")
                .stdout_path("shared.log")
                .stderr_path("b_err.log")
                .build(),
        )
        .build();
    assert_rejected(config, "more than one stream");
}

#[test]
fn criteria_must_reference_known_programs_and_states() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program("a", ProgramConfigBuilder::new("echo a").build())
        .success_criteria(PredicateMode::All, &[("ghost", "final")])
        .build();
    assert_rejected(config, "unknown program 'ghost'");

    let config = ConfigFileBuilder::new("state_times.json")
        .with_program("a", ProgramConfigBuilder::new("echo a").build())
        .success_criteria(PredicateMode::All, &[("a", "warmed_up")])
        .build();
    assert_rejected(config, "can never reach 'warmed_up'");

    let config = ConfigFileBuilder::new("state_times.json")
        .with_program("a", ProgramConfigBuilder::new("echo a").build())
        .success_criteria(PredicateMode::All, &[])
        .build();
    assert_rejected(config, "no items");
}

#[test]
fn diamond_dependencies_are_valid() {
    let config = ConfigFileBuilder::new("state_times.json")
        .with_program("root", ProgramConfigBuilder::new("echo root").build())
        .with_program(
            "left",
            ProgramConfigBuilder::new("echo l")
                .depends_on("root", "action_success")
                .build(),
        )
        .with_program(
            "right",
            ProgramConfigBuilder::new("echo r")
                .depends_on("root", "action_success")
                .build(),
        )
        .with_program(
            "join",
            ProgramConfigBuilder::new("echo j")
                .depends_on("left", "action_success")
                .depends_on("right", "action_success")
                .build(),
        )
        .build();
    assert!(validate_config(&config).is_ok());
}
