// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_adapters::FakeNotifyAdapter;
use bm_core::{ConfigError, FakeClock, WorkerName};
use tempfile::TempDir;

const TABLES: &str = r#"
[[lock]]
name = "repo"
max_count = 2

[[worker]]
name = "linux-1"
builders = ["build"]
locks = [{ lock = "repo", mode = "exclusive" }]

[[worker]]
name = "cloud"
builders = ["build"]

[worker.latent]
build_wait_timeout = 600
provisioner = { type = "command", start = "up", stop = "down" }
"#;

fn config_in(dir: &TempDir, tables: &str) -> Config {
    let path = dir.path().join("master.toml");
    std::fs::write(&path, tables).unwrap();
    Config::in_dir(dir.path().join("state"), path)
}

#[tokio::test]
async fn startup_loads_tables_and_writes_pid() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, TABLES);
    let daemon = startup(config.clone(), FakeNotifyAdapter::new(), FakeClock::new()).unwrap();

    assert_eq!(daemon.master.worker_names(), vec![WorkerName::new("linux-1"), WorkerName::new("cloud")]);
    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
}

#[tokio::test]
async fn second_daemon_is_refused() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, TABLES);
    let _first = startup(config.clone(), FakeNotifyAdapter::new(), FakeClock::new()).unwrap();

    let second = startup(config, FakeNotifyAdapter::new(), FakeClock::new());
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
}

#[tokio::test]
async fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = Config::in_dir(dir.path().to_path_buf(), dir.path().join("absent.toml"));
    let result = startup(config, FakeNotifyAdapter::new(), FakeClock::new());
    assert!(matches!(result, Err(LifecycleError::ConfigRead(..))));
}

#[test]
fn invalid_tables_are_rejected() {
    let dir = TempDir::new().unwrap();
    let config = config_in(
        &dir,
        r#"
[[worker]]
name = "w1"
locks = [{ lock = "nope" }]
"#,
    );
    let err = load_master_config(&config.config_path).unwrap_err();
    assert!(matches!(err, LifecycleError::Config(ConfigError::UnknownLock { .. })));
}

#[test]
fn unknown_access_mode_fails_to_parse() {
    let dir = TempDir::new().unwrap();
    let config = config_in(
        &dir,
        r#"
[[lock]]
name = "repo"

[[worker]]
name = "w1"
locks = [{ lock = "repo", mode = "shared" }]
"#,
    );
    let err = load_master_config(&config.config_path).unwrap_err();
    assert!(matches!(err, LifecycleError::Config(ConfigError::Parse(_))));
}
