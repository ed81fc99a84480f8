// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_adapters::FakeNotifyAdapter;
use bm_core::{FakeClock, WorkerName};
use tempfile::TempDir;
use tokio::sync::oneshot;

const WATCHED: &str = r#"
[[worker]]
name = "w1"
builders = ["build"]
missing_timeout = 5
notify_on_missing = ["ops@example.com"]
"#;

struct Harness {
    _dir: TempDir,
    config: Config,
    daemon: Daemon<FakeNotifyAdapter, FakeClock>,
    notifier: FakeNotifyAdapter,
    clock: FakeClock,
}

fn harness(tables: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("master.toml");
    std::fs::write(&path, tables).unwrap();
    let mut config = Config::in_dir(dir.path().join("state"), path);
    config.timer_check = Duration::from_millis(10);

    let notifier = FakeNotifyAdapter::new();
    let clock = FakeClock::new();
    let daemon = startup(config.clone(), notifier.clone(), clock.clone()).unwrap();
    Harness { _dir: dir, config, daemon, notifier, clock }
}

#[test]
fn config_layout_lives_under_state_dir() {
    let config = Config::in_dir(PathBuf::from("/var/lib/bm"), PathBuf::from("/etc/bm.toml"));
    assert_eq!(config.lock_path, PathBuf::from("/var/lib/bm/daemon.pid"));
    assert_eq!(config.log_path, PathBuf::from("/var/lib/bm/daemon.log"));
    assert_eq!(config.config_path, PathBuf::from("/etc/bm.toml"));
    assert_eq!(config.timer_check, Duration::from_secs(1));
    assert_eq!(config.notify, NotifyBackend::Log);
}

#[tokio::test]
async fn run_loop_fires_timers_until_shutdown() {
    let Harness { _dir, config, daemon, notifier, clock } = harness(WATCHED);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(daemon.run(async move {
        let _ = stop_rx.await;
    }));

    clock.advance(Duration::from_secs(5));
    for _ in 0..100 {
        if !notifier.calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].subject, "worker w1 missing");

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert!(!config.lock_path.exists());
}

#[tokio::test]
async fn reload_applies_new_tables() {
    let harness = harness(WATCHED);
    std::fs::write(
        &harness.config.config_path,
        r#"
[[worker]]
name = "w2"
builders = ["build"]
"#,
    )
    .unwrap();

    harness.daemon.reload().unwrap();
    assert_eq!(harness.daemon.master.worker_names(), vec![WorkerName::new("w2")]);
}

#[tokio::test]
async fn failed_reload_keeps_running_tables() {
    let harness = harness(WATCHED);
    std::fs::write(&harness.config.config_path, "[[worker]]\nname = \"\"\n").unwrap();

    assert!(harness.daemon.reload().is_err());
    assert_eq!(harness.daemon.master.worker_names(), vec![WorkerName::new("w1")]);
}

#[tokio::test]
async fn shutdown_releases_pid_file() {
    let harness = harness(WATCHED);
    assert!(harness.config.lock_path.exists());
    harness.daemon.shutdown().await;
    assert!(!harness.config.lock_path.exists());

    // The lock is free again
    let again = startup(harness.config.clone(), FakeNotifyAdapter::new(), FakeClock::new());
    assert!(again.is_ok());
}
