// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use phasedag::config::{ConfigFile, load_and_validate, load_from_path, load_or_default};
use phasedag::dag::DependencyResolver;
use phasedag::errors::PhasedagError;
use phasedag::plan::ExecutionOptions;
use phasedag_test_utils::builders::ConfigFileBuilder;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_is_parsed() {
    let file = config_file(
        r#"
[execution]
max_parallel_phases = 5
phase_timeout_ms = 1000
auto_approve_low_risk = true
treat_skipped_as_satisfied = true

[checkpoints]
root = "state/cps"
retention_days = 30
max_checkpoints = 50

[task.build]

[task.test]
after = ["build"]
priority = 2

[task.lint]
after = ["build"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.execution.max_parallel_phases, 5);
    assert_eq!(cfg.execution.phase_timeout_ms, 1000);
    assert!(cfg.execution.auto_approve_low_risk);
    assert!(cfg.execution.treat_skipped_as_satisfied);
    assert!(cfg.execution.create_checkpoints, "unset keys keep their default");
    assert_eq!(cfg.checkpoints.root, PathBuf::from("state/cps"));

    let retention = cfg.checkpoints.retention();
    assert_eq!(retention.retention_days, Some(30));
    assert_eq!(retention.max_checkpoints, Some(50));
    assert_eq!(retention.compress_after_days, None);

    let batches = DependencyResolver::new()
        .resolve_dependencies(&cfg.to_tasks())
        .unwrap();
    assert_eq!(batches, vec![vec!["build"], vec!["test", "lint"]]);
}

#[test]
fn empty_config_uses_defaults() {
    let file = config_file("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.execution, ExecutionOptions::default());
    assert_eq!(cfg.execution.max_parallel_phases, 3);
    assert_eq!(cfg.execution.phase_timeout_ms, 300_000);
    assert_eq!(cfg.checkpoints.root, PathBuf::from(".phasedag/checkpoints"));
    assert!(cfg.task.is_empty());
}

#[test]
fn missing_file_can_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Phasedag.toml");

    assert!(matches!(load_and_validate(&missing), Err(PhasedagError::IoError(_))));
    let cfg = load_or_default(&missing).unwrap();
    assert_eq!(cfg.execution, ExecutionOptions::default());
}

#[test]
fn cycle_returns_structured_error() {
    let file = config_file(
        r#"
[task.A]
after = ["B"]

[task.B]
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(PhasedagError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('A') && msg.contains('B'));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_config_error() {
    let file = config_file(
        r#"
[task.A]
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(PhasedagError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn self_dependency_returns_config_error() {
    let file = config_file(
        r#"
[task.A]
after = ["A"]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(PhasedagError::ConfigError(msg)) if msg.contains("itself")
    ));
}

#[test]
fn zero_limits_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_execution(ExecutionOptions {
            max_parallel_phases: 0,
            ..ExecutionOptions::default()
        })
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(PhasedagError::ConfigError(msg)) if msg.contains("max_parallel_phases")
    ));

    let file = config_file("[execution]\nphase_timeout_ms = 0\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(PhasedagError::ConfigError(msg)) if msg.contains("phase_timeout_ms")
    ));

    let file = config_file("[checkpoints]\nmax_checkpoints = 0\n");
    assert!(load_and_validate(file.path()).is_err());
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = config_file("[execution\nmax_parallel_phases = 2");
    assert!(matches!(load_from_path(file.path()), Err(PhasedagError::TomlError(_))));

    let file = config_file("[execution]\nmax_parallel_phases = \"lots\"\n");
    assert!(matches!(load_from_path(file.path()), Err(PhasedagError::TomlError(_))));
}

#[test]
fn builder_produces_resolvable_tasks() {
    let cfg = ConfigFileBuilder::new()
        .with_task("a", &[])
        .with_task("b", &["a"])
        .build();
    let tasks = cfg.to_tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1].dependencies, vec!["a"]);
}
