// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock and worker tables.
//!
//! [`RawConfig`] mirrors the TOML layout (durations in seconds, locks
//! referenced by name). [`RawConfig::validate`] resolves it into a
//! [`MasterConfig`] of value objects, failing on the first problem found.
//!
//! ```toml
//! [[lock]]
//! name = "repo"
//! max_count = 2
//!
//! [[worker]]
//! name = "linux-1"
//! password = "secret"
//! builders = ["build"]
//! locks = [{ lock = "repo", mode = "counting" }]
//! ```

use crate::lock::{AccessMode, LockAccess, LockIdentifier, LockScope};
use crate::worker::{
    LatentConfig, ProvisionerConfig, WorkerConfig, WorkerName, DEFAULT_BUILD_WAIT_TIMEOUT,
    DEFAULT_MISSING_TIMEOUT, DEFAULT_SUBSTANTIATION_TIMEOUT,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate worker name '{0}'")]
    DuplicateWorker(String),
    #[error("duplicate lock name '{0}'")]
    DuplicateLock(String),
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
    #[error("lock '{lock}' needs max_count >= 1")]
    InvalidMaxCount { lock: String },
    #[error("lock '{lock}' override for worker '{worker}' needs max_count >= 1")]
    InvalidOverride { lock: String, worker: String },
    #[error("lock '{lock}' is master-scoped and cannot have per-worker overrides")]
    OverrideOnMasterLock { lock: String },
    #[error("worker '{worker}' references unknown lock '{lock}'")]
    UnknownLock { worker: String, lock: String },
    #[error("worker '{worker}' needs max_builds >= 1 when set")]
    InvalidMaxBuilds { worker: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default, rename = "lock")]
    pub locks: Vec<RawLock>,
    #[serde(default, rename = "worker")]
    pub workers: Vec<RawWorker>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLock {
    pub name: String,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    #[serde(default = "default_scope")]
    pub scope: LockScope,
    #[serde(default)]
    pub per_worker_max_count: BTreeMap<String, u32>,
}

fn default_max_count() -> u32 {
    1
}

fn default_scope() -> LockScope {
    LockScope::Master
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLockAccess {
    pub lock: String,
    #[serde(default = "default_mode")]
    pub mode: AccessMode,
}

fn default_mode() -> AccessMode {
    AccessMode::Counting
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorker {
    pub name: String,
    #[serde(default)]
    pub password: String,
    pub max_builds: Option<u32>,
    /// Seconds.
    pub missing_timeout: Option<u64>,
    #[serde(default)]
    pub notify_on_missing: Vec<String>,
    #[serde(default)]
    pub locks: Vec<RawLockAccess>,
    #[serde(default)]
    pub builders: Vec<String>,
    pub latent: Option<RawLatent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLatent {
    /// Seconds. Negative keeps the instance until insubstantiated by hand.
    pub build_wait_timeout: Option<i64>,
    /// Seconds.
    pub substantiation_timeout: Option<u64>,
    /// Seconds.
    pub start_retry_backoff: Option<u64>,
    pub provisioner: ProvisionerConfig,
}

/// Validated worker and lock tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterConfig {
    pub locks: Vec<LockIdentifier>,
    pub workers: Vec<WorkerConfig>,
}

impl MasterConfig {
    /// Parse and validate a TOML document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        raw.validate()
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerConfig> {
        self.workers.iter().find(|w| w.name == name)
    }
}

impl RawConfig {
    pub fn validate(self) -> Result<MasterConfig, ConfigError> {
        let mut locks: HashMap<String, LockIdentifier> = HashMap::new();
        let mut lock_order = Vec::with_capacity(self.locks.len());
        for raw in self.locks {
            let lock = validate_lock(raw)?;
            if locks.contains_key(&lock.name) {
                return Err(ConfigError::DuplicateLock(lock.name));
            }
            lock_order.push(lock.name.clone());
            locks.insert(lock.name.clone(), lock);
        }

        let mut seen = HashSet::new();
        let mut workers = Vec::with_capacity(self.workers.len());
        for raw in self.workers {
            if raw.name.is_empty() {
                return Err(ConfigError::EmptyName { kind: "worker" });
            }
            if !seen.insert(raw.name.clone()) {
                return Err(ConfigError::DuplicateWorker(raw.name));
            }
            workers.push(validate_worker(raw, &locks)?);
        }

        let locks = lock_order.into_iter().filter_map(|name| locks.remove(&name)).collect();
        Ok(MasterConfig { locks, workers })
    }
}

fn validate_lock(raw: RawLock) -> Result<LockIdentifier, ConfigError> {
    if raw.name.is_empty() {
        return Err(ConfigError::EmptyName { kind: "lock" });
    }
    if raw.max_count == 0 {
        return Err(ConfigError::InvalidMaxCount { lock: raw.name });
    }
    if raw.scope == LockScope::Master && !raw.per_worker_max_count.is_empty() {
        return Err(ConfigError::OverrideOnMasterLock { lock: raw.name });
    }
    if let Some((worker, _)) = raw.per_worker_max_count.iter().find(|(_, count)| **count == 0) {
        return Err(ConfigError::InvalidOverride { lock: raw.name.clone(), worker: worker.clone() });
    }
    Ok(LockIdentifier {
        name: raw.name,
        max_count: raw.max_count,
        scope: raw.scope,
        per_worker_max_count: raw.per_worker_max_count,
    })
}

fn validate_worker(
    raw: RawWorker,
    locks: &HashMap<String, LockIdentifier>,
) -> Result<WorkerConfig, ConfigError> {
    if raw.max_builds == Some(0) {
        return Err(ConfigError::InvalidMaxBuilds { worker: raw.name });
    }
    let accesses = raw
        .locks
        .into_iter()
        .map(|access| match locks.get(&access.lock) {
            Some(lock) => Ok(LockAccess { lock: lock.clone(), mode: access.mode }),
            None => Err(ConfigError::UnknownLock { worker: raw.name.clone(), lock: access.lock }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let latent = raw.latent.map(|latent| LatentConfig {
        build_wait_timeout: match latent.build_wait_timeout {
            None => Some(DEFAULT_BUILD_WAIT_TIMEOUT),
            Some(secs) if secs < 0 => None,
            Some(secs) => Some(Duration::from_secs(secs.unsigned_abs())),
        },
        substantiation_timeout: latent
            .substantiation_timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SUBSTANTIATION_TIMEOUT),
        start_retry_backoff: latent.start_retry_backoff.map(Duration::from_secs),
        provisioner: latent.provisioner,
    });

    Ok(WorkerConfig {
        name: WorkerName::new(raw.name),
        password: raw.password,
        max_builds: raw.max_builds,
        missing_timeout: raw.missing_timeout.map(Duration::from_secs).unwrap_or(DEFAULT_MISSING_TIMEOUT),
        notify_on_missing: raw.notify_on_missing,
        locks: accesses,
        builders: raw.builders,
        latent,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
