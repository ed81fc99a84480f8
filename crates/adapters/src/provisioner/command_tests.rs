// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::WorkerName;

fn provisioner(start: &str, stop: &str) -> CommandProvisioner {
    CommandProvisioner::new(start.to_string(), stop.to_string(), Duration::from_secs(5))
}

fn ctx() -> StartContext {
    StartContext { worker: WorkerName::new("cloud-1"), builder: Some("build".into()), build: None }
}

#[tokio::test]
async fn exit_zero_is_launched() {
    assert!(provisioner("exit 0", "true").start(&ctx()).await.unwrap());
}

#[tokio::test]
async fn tempfail_is_declined() {
    assert!(!provisioner("exit 75", "true").start(&ctx()).await.unwrap());
}

#[tokio::test]
async fn other_exit_is_error_with_stderr() {
    let err = provisioner("echo no quota >&2; exit 3", "true").start(&ctx()).await.unwrap_err();
    assert_eq!(err.to_string(), "start failed: exit 3: no quota");
}

#[tokio::test]
async fn start_exports_worker_and_builder() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("env");
    let script = format!("echo \"$BM_WORKER_NAME $BM_BUILDER\" > {}", out.display());
    provisioner(&script, "true").start(&ctx()).await.unwrap();
    assert_eq!(std::fs::read_to_string(out).unwrap().trim(), "cloud-1 build");
}

async fn fast_flag_seen_by_stop_script(fast: bool) -> String {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("fast");
    let script = format!("echo $BM_FAST_STOP > {}", out.display());
    provisioner("true", &script).stop(fast).await.unwrap();
    std::fs::read_to_string(out).unwrap().trim().to_string()
}

#[tokio::test]
async fn stop_exports_fast_flag() {
    assert_eq!(fast_flag_seen_by_stop_script(true).await, "1");
    assert_eq!(fast_flag_seen_by_stop_script(false).await, "0");
}

#[tokio::test]
async fn failing_stop_is_error() {
    assert!(matches!(
        provisioner("true", "exit 1").stop(true).await,
        Err(ProvisionError::StopFailed(_))
    ));
}

#[tokio::test]
async fn slow_script_times_out() {
    let p = CommandProvisioner::new("sleep 5".into(), "true".into(), Duration::from_millis(50));
    assert!(matches!(p.start(&ctx()).await, Err(ProvisionError::Timeout(_))));
}
