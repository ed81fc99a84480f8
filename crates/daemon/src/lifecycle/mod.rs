// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, the event loop, shutdown.

mod startup;
pub use startup::{load_master_config, setup_logging, startup};

use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bm_adapters::NotifyAdapter;
use bm_core::{Clock, ConfigError, Event};
use bm_engine::BotMaster;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::env::{self, NotifyBackend};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/bm)
    pub state_dir: PathBuf,
    /// Worker and lock tables (TOML)
    pub config_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Interval between timer checks
    pub timer_check: Duration,
    /// Where operator notifications go
    pub notify: NotifyBackend,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        let config_path = env::config_path().unwrap_or_else(|| state_dir.join("master.toml"));
        let mut config = Self::in_dir(state_dir, config_path);
        config.timer_check = env::timer_check();
        config.notify = env::notify_backend()?;
        Ok(config)
    }

    /// Fixed layout under `state_dir` with default knobs.
    pub fn in_dir(state_dir: PathBuf, config_path: PathBuf) -> Self {
        Self {
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            config_path,
            timer_check: Duration::from_secs(1),
            notify: NotifyBackend::Log,
            state_dir,
        }
    }
}

/// A running build master and the loop that feeds it.
pub struct Daemon<N, C> {
    pub config: Config,
    pub master: BotMaster<N, C>,
    event_rx: mpsc::Receiver<Event>,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl<N, C> Daemon<N, C>
where
    N: NotifyAdapter,
    C: Clock,
{
    /// Re-read the worker and lock tables and apply them.
    ///
    /// A config that fails to load leaves the running one in place.
    pub fn reload(&self) -> Result<(), LifecycleError> {
        let config = load_master_config(&self.config.config_path)?;
        info!(workers = config.workers.len(), locks = config.locks.len(), "reloading configuration");
        self.master.reconfigure(config);
        Ok(())
    }

    /// Process background events and timers until `shutdown` resolves.
    ///
    /// SIGHUP reloads the configuration file.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), LifecycleError> {
        let mut ticker = tokio::time::interval(self.config.timer_check);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut hangup = signal(SignalKind::hangup())?;
        tokio::pin!(shutdown);

        info!(timer_check_ms = self.config.timer_check.as_millis() as u64, "daemon running");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(event) = self.event_rx.recv() => self.master.handle_event(event),
                _ = ticker.tick() => {
                    let fired = self.master.tick();
                    if fired > 0 {
                        debug!(fired, "timers fired");
                    }
                }
                Some(()) = hangup.recv() => {
                    if let Err(e) = self.reload() {
                        warn!(error = %e, "reload failed, keeping current configuration");
                    }
                }
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Stop latent instances and remove the PID file.
    pub async fn shutdown(self) {
        info!("Shutting down daemon...");
        self.master.shutdown().await;
        remove_if_exists(&self.config.lock_path);
        info!("Daemon shutdown complete");
    }
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), "Failed to remove file: {}", e);
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to set up logging: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
