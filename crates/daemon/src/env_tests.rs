// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear(vars: &[&str]) {
    for var in vars {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn state_dir_prefers_explicit_override() {
    std::env::set_var("BM_STATE_DIR", "/tmp/bm-explicit");
    std::env::set_var("XDG_STATE_HOME", "/tmp/xdg");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/bm-explicit"));

    std::env::remove_var("BM_STATE_DIR");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/xdg/bm"));
    clear(&["XDG_STATE_HOME"]);
}

#[test]
#[serial]
fn timer_check_defaults_to_one_second() {
    clear(&["BM_TIMER_CHECK_MS"]);
    assert_eq!(timer_check(), Duration::from_secs(1));

    std::env::set_var("BM_TIMER_CHECK_MS", "250");
    assert_eq!(timer_check(), Duration::from_millis(250));

    for bad in ["0", "soon"] {
        std::env::set_var("BM_TIMER_CHECK_MS", bad);
        assert_eq!(timer_check(), Duration::from_secs(1));
    }
    clear(&["BM_TIMER_CHECK_MS"]);
}

#[test]
#[serial]
fn config_path_ignores_empty_value() {
    std::env::set_var("BM_CONFIG", "");
    assert_eq!(config_path(), None);
    std::env::set_var("BM_CONFIG", "/etc/bm/master.toml");
    assert_eq!(config_path(), Some(PathBuf::from("/etc/bm/master.toml")));
    clear(&["BM_CONFIG"]);
}

#[test]
#[serial]
fn log_filter_precedence() {
    clear(&["BM_LOG", "RUST_LOG"]);
    assert_eq!(log_filter(), "info");

    std::env::set_var("RUST_LOG", "warn");
    assert_eq!(log_filter(), "warn");

    std::env::set_var("BM_LOG", "bm_engine=debug");
    assert_eq!(log_filter(), "bm_engine=debug");
    clear(&["BM_LOG", "RUST_LOG"]);
}

#[test]
#[serial]
fn notify_backend_is_a_closed_set() {
    clear(&["BM_NOTIFY"]);
    assert_eq!(notify_backend().unwrap(), NotifyBackend::Log);

    std::env::set_var("BM_NOTIFY", "desktop");
    assert_eq!(notify_backend().unwrap(), NotifyBackend::Desktop);

    std::env::set_var("BM_NOTIFY", "email");
    assert!(matches!(notify_backend(), Err(LifecycleError::InvalidEnv { var: "BM_NOTIFY", .. })));
    clear(&["BM_NOTIFY"]);
}
