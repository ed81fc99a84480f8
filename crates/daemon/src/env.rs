// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: BM_STATE_DIR > XDG_STATE_HOME/bm > ~/.local/state/bm
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("BM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("bm"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/bm"))
}

/// Worker and lock tables. Defaults to `master.toml` in the state directory.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("BM_CONFIG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// How often due timers are fired (default 1s).
pub fn timer_check() -> Duration {
    std::env::var("BM_TIMER_CHECK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Log filter directives: BM_LOG > RUST_LOG > "info"
pub fn log_filter() -> String {
    std::env::var("BM_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Where operator notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyBackend {
    /// The daemon log
    #[default]
    Log,
    /// Desktop notifications on the machine running the daemon
    Desktop,
}

/// Notification backend from `BM_NOTIFY` (`log` | `desktop`, default `log`).
pub fn notify_backend() -> Result<NotifyBackend, LifecycleError> {
    match std::env::var("BM_NOTIFY").ok().as_deref() {
        None | Some("") | Some("log") => Ok(NotifyBackend::Log),
        Some("desktop") => Ok(NotifyBackend::Desktop),
        Some(other) => Err(LifecycleError::InvalidEnv { var: "BM_NOTIFY", value: other.to_string() }),
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
