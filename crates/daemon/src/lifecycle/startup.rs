// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::path::Path;

use bm_adapters::NotifyAdapter;
use bm_core::{Clock, MasterConfig};
use bm_engine::{BotMaster, MasterDeps};
use fs2::FileExt;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use super::{Config, Daemon, LifecycleError};
use crate::env;

/// Background events buffered between loop iterations.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Read and validate the worker and lock tables.
pub fn load_master_config(path: &Path) -> Result<MasterConfig, LifecycleError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| LifecycleError::ConfigRead(path.to_path_buf(), e))?;
    Ok(MasterConfig::parse(&text)?)
}

/// Install the global subscriber writing to `config.log_path`.
///
/// The returned guard flushes the writer on drop; hold it for process life.
pub fn setup_logging(config: &Config) -> Result<WorkerGuard, LifecycleError> {
    let dir = config.log_path.parent().unwrap_or(&config.state_dir);
    std::fs::create_dir_all(dir)?;
    let file_name = config.log_path.file_name().unwrap_or("daemon.log".as_ref());
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let filter = EnvFilter::try_new(env::log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;
    Ok(guard)
}

/// Start the daemon: take the PID lock, load configuration, build the master.
pub fn startup<N, C>(config: Config, notifier: N, clock: C) -> Result<Daemon<N, C>, LifecycleError>
where
    N: NotifyAdapter,
    C: Clock,
{
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents two masters over one config
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Load worker and lock tables
    let master_config = load_master_config(&config.config_path)?;

    // 4. Build the master
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let master = BotMaster::new(MasterDeps::new(notifier), clock, event_tx);
    info!(
        config = %config.config_path.display(),
        workers = master_config.workers.len(),
        locks = master_config.locks.len(),
        "daemon started"
    );
    master.reconfigure(master_config);

    Ok(Daemon { config, master, event_rx, lock_file })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
