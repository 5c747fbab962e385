//! Unit tests for TOML configuration parsing and validation.

use fleet_foreman::config::GlobalConfig;
use fleet_foreman::AppError;

const FULL_CONFIG: &str = r#"
http_port = 4100

[supervisor]
health_interval_seconds = 10
ready_poll_interval_ms = 500
ready_max_attempts = 12
probe_timeout_ms = 1500
stop_grace_seconds = 3

[coordinator]
max_concurrent_sessions = 4
history_capacity = 50
stale_after_seconds = 600

[[workers]]
name = "Search Worker"
type = "search"
command = "search-worker"
args = ["--verbose"]
port = 9101

[[workers]]
name = "Index Worker"
type = "index"
command = "index-worker"
port = 9102
enabled = false
"#;

#[test]
fn full_config_parses() {
    let config = GlobalConfig::from_toml_str(FULL_CONFIG).expect("parse");

    assert_eq!(config.http_port, 4100);
    assert_eq!(config.supervisor.health_interval_seconds, 10);
    assert_eq!(config.supervisor.ready_max_attempts, 12);
    assert_eq!(config.coordinator.max_concurrent_sessions, 4);
    assert_eq!(config.coordinator.history_capacity, 50);
    assert_eq!(config.workers.len(), 2);
    assert_eq!(config.workers[0].kind, "search");
    assert_eq!(config.workers[0].args, vec!["--verbose".to_owned()]);
    assert!(config.workers[0].enabled, "enabled defaults to true");
    assert!(!config.workers[1].enabled);
}

#[test]
fn empty_config_gets_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("parse");

    assert_eq!(config.http_port, 3000);
    assert_eq!(config.supervisor.health_interval_seconds, 30);
    assert_eq!(config.supervisor.ready_max_attempts, 30);
    assert_eq!(config.supervisor.stop_grace_seconds, 5);
    assert_eq!(config.coordinator.max_concurrent_sessions, 10);
    assert_eq!(config.coordinator.history_capacity, 100);
    assert_eq!(config.coordinator.stale_after_seconds, 1800);
    assert!(config.workers.is_empty());
}

#[test]
fn zero_session_ceiling_rejected() {
    let raw = "[coordinator]\nmax_concurrent_sessions = 0\n";
    let err = GlobalConfig::from_toml_str(raw).expect_err("must reject");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn zero_history_capacity_rejected() {
    let raw = "[coordinator]\nhistory_capacity = 0\n";
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn zero_ready_attempts_rejected() {
    let raw = "[supervisor]\nready_max_attempts = 0\n";
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn duplicate_worker_type_rejected() {
    let raw = r#"
[[workers]]
name = "A"
type = "dup"
command = "a"
port = 9000

[[workers]]
name = "B"
type = "dup"
command = "b"
port = 9001
"#;
    let err = GlobalConfig::from_toml_str(raw).expect_err("must reject");
    assert!(err.to_string().contains("duplicate worker type"));
}

#[test]
fn empty_worker_command_rejected() {
    let raw = r#"
[[workers]]
name = "A"
type = "a"
command = ""
port = 9000
"#;
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn invalid_toml_rejected() {
    assert!(GlobalConfig::from_toml_str("not valid [[ toml").is_err());
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, FULL_CONFIG).expect("write");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.workers.len(), 2);
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/nonexistent/config.toml").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}
