// tests/config_errors.rs

use std::io::Write;

use tempfile::NamedTempFile;

use swarmstate::config::{ConfigFile, load_and_validate, load_or_default};
use swarmstate::errors::SwarmError;
use swarmstate::types::GcMethod;
use swarmstate_test_utils::builders::ConfigFileBuilder;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_loads() {
    let file = config_file(
        r#"
[manager]
state_dir = "/var/lib/swarm"
devices = 4

[journal]
commit_retries = 5
max_concurrent_writes = 8

[gc]
method = "on_demand"
capacity_bytes = 1000
threshold_bytes = 100
sweep_interval_ms = 50
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.manager.devices, 4);
    assert_eq!(cfg.journal.commit_retries, 5);
    assert_eq!(cfg.gc.method, GcMethod::OnDemand);
    assert_eq!(cfg.sweep_interval(), Some(std::time::Duration::from_millis(50)));
}

#[test]
fn unknown_gc_method_is_a_toml_error() {
    let file = config_file("[gc]\nmethod = \"sometimes\"\n");
    match load_and_validate(file.path()) {
        Err(SwarmError::TomlError(_)) => {}
        other => panic!("expected TomlError, got {other:?}"),
    }
}

#[test]
fn semantic_problems_are_config_errors() {
    let file = config_file("[gc]\nmethod = \"on_demand\"\ncapacity_bytes = 0\n");
    match load_and_validate(file.path()) {
        Err(SwarmError::ConfigError(msg)) => assert!(msg.contains("capacity_bytes")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(SwarmError::IoError(_))));
}

#[test]
fn missing_default_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load_or_default(dir.path().join("Swarmstate.toml")).unwrap();
    let cfg = ConfigFile::try_from(raw).unwrap();
    assert_eq!(cfg.manager.state_dir, std::path::PathBuf::from(".swarmstate"));
}

#[test]
fn builder_produces_valid_config() {
    let cfg = ConfigFileBuilder::new()
        .devices(2)
        .gc(GcMethod::OnDemand)
        .storage(500, 50)
        .build();
    assert_eq!(cfg.gc.capacity_bytes, 500);

    let raw = ConfigFileBuilder::new().gc(GcMethod::OnDemand).raw();
    assert!(ConfigFile::try_from(raw).is_err());
}
