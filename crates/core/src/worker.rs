// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker names, validated worker configuration, and reported worker info.

use crate::lock::LockAccess;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

/// Configured name of a worker. Unique within one master.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerName(pub String);

impl WorkerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Default delay before an operator hears about a missing worker.
pub const DEFAULT_MISSING_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default deadline for a latent instance to boot and attach.
pub const DEFAULT_SUBSTANTIATION_TIMEOUT: Duration = Duration::from_secs(1200);
/// Default idle period before a latent instance is reclaimed.
pub const DEFAULT_BUILD_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Validated configuration for one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub name: WorkerName,
    /// Credential the connection layer checks before attaching. Never logged.
    pub password: String,
    /// `None` means no limit on concurrent builds.
    pub max_builds: Option<u32>,
    pub missing_timeout: Duration,
    /// Operator addresses told about a missing worker. Empty disables the missing timer.
    pub notify_on_missing: Vec<String>,
    /// Locks every build on this worker must hold.
    pub locks: Vec<LockAccess>,
    /// Builders that may run on this worker.
    pub builders: Vec<String>,
    /// Present when the worker is provisioned on demand.
    pub latent: Option<LatentConfig>,
}

crate::builder! {
    pub struct WorkerConfigBuilder => WorkerConfig {
        into {
            name: WorkerName = "worker",
            password: String = "pass",
        }
        set {
            max_builds: Option<u32> = None,
            missing_timeout: Duration = DEFAULT_MISSING_TIMEOUT,
            notify_on_missing: Vec<String> = Vec::new(),
            locks: Vec<LockAccess> = Vec::new(),
            builders: Vec<String> = vec!["build".to_string()],
        }
        option {
            latent: LatentConfig = None,
        }
    }
}

impl WorkerConfig {
    pub fn is_latent(&self) -> bool {
        self.latent.is_some()
    }

    /// Whether the missing timer should run while this worker is disconnected.
    pub fn wants_missing_timer(&self) -> bool {
        !self.notify_on_missing.is_empty() && !self.missing_timeout.is_zero()
    }
}

/// On-demand provisioning settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentConfig {
    /// Idle period after the last build before the instance is stopped.
    /// `None` keeps the instance until an operator insubstantiates it.
    pub build_wait_timeout: Option<Duration>,
    /// Deadline for a started instance to attach.
    pub substantiation_timeout: Duration,
    /// Minimum delay after a declined or failed start before trying again.
    /// `None` retries on the next request.
    pub start_retry_backoff: Option<Duration>,
    pub provisioner: ProvisionerConfig,
}

impl LatentConfig {
    pub fn new(provisioner: ProvisionerConfig) -> Self {
        Self {
            build_wait_timeout: Some(DEFAULT_BUILD_WAIT_TIMEOUT),
            substantiation_timeout: DEFAULT_SUBSTANTIATION_TIMEOUT,
            start_retry_backoff: None,
            provisioner,
        }
    }

    crate::setters! {
        set {
            build_wait_timeout: Option<Duration>,
            substantiation_timeout: Duration,
            start_retry_backoff: Option<Duration>,
        }
    }
}

/// How the instance behind a latent worker is started and stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProvisionerConfig {
    /// Shell commands run on the master host.
    Command {
        start: String,
        stop: String,
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_command_timeout_secs() -> u64 {
    300
}

impl ProvisionerConfig {
    pub fn command(start: impl Into<String>, stop: impl Into<String>) -> Self {
        ProvisionerConfig::Command {
            start: start.into(),
            stop: stop.into(),
            timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// What a worker reported about itself while attaching.
///
/// Every field is best-effort: `None` means the worker did not (or could
/// not) say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub admin: Option<String>,
    pub host: Option<String>,
    pub access_uri: Option<String>,
    pub version: Option<String>,
    /// Remote command name to command version.
    pub commands: Option<std::collections::BTreeMap<String, String>>,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
