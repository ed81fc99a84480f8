// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock identifiers and access requests.
//!
//! A [`LockIdentifier`] is a configuration value: two identifiers that
//! compare equal name the same underlying lock, even when one was rebuilt
//! from a reloaded configuration. Everything that contributes to how the
//! lock behaves (name, limits, scope) participates in equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// How a build wants to hold a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Shared with up to `max_count` other counting holders.
    Counting,
    /// Sole holder; excludes counting holders too.
    Exclusive,
}

crate::simple_display! {
    AccessMode {
        Counting => "counting",
        Exclusive => "exclusive",
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown lock access mode '{0}' (expected 'counting' or 'exclusive')")]
pub struct ParseAccessModeError(pub String);

impl FromStr for AccessMode {
    type Err = ParseAccessModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counting" => Ok(AccessMode::Counting),
            "exclusive" => Ok(AccessMode::Exclusive),
            other => Err(ParseAccessModeError(other.to_string())),
        }
    }
}

/// Whether a lock is shared across the whole master or instantiated per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    Master,
    Worker,
}

crate::simple_display! {
    LockScope {
        Master => "master",
        Worker => "worker",
    }
}

/// Configured lock. Structural equality is lock identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockIdentifier {
    pub name: String,
    pub max_count: u32,
    pub scope: LockScope,
    /// Per-worker overrides of `max_count` (worker scope only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_worker_max_count: BTreeMap<String, u32>,
}

impl LockIdentifier {
    pub fn master(name: impl Into<String>, max_count: u32) -> Self {
        Self {
            name: name.into(),
            max_count,
            scope: LockScope::Master,
            per_worker_max_count: BTreeMap::new(),
        }
    }

    pub fn worker(name: impl Into<String>, max_count: u32) -> Self {
        Self {
            name: name.into(),
            max_count,
            scope: LockScope::Worker,
            per_worker_max_count: BTreeMap::new(),
        }
    }

    /// Override `max_count` for one worker.
    pub fn with_worker_max_count(mut self, worker: impl Into<String>, max_count: u32) -> Self {
        self.per_worker_max_count.insert(worker.into(), max_count);
        self
    }

    /// Effective limit for the lock instance belonging to `worker`.
    pub fn max_count_for(&self, worker: &str) -> u32 {
        self.per_worker_max_count.get(worker).copied().unwrap_or(self.max_count)
    }

    pub fn counting(&self) -> LockAccess {
        LockAccess { lock: self.clone(), mode: AccessMode::Counting }
    }

    pub fn exclusive(&self) -> LockAccess {
        LockAccess { lock: self.clone(), mode: AccessMode::Exclusive }
    }
}

/// A request to hold `lock` in `mode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockAccess {
    pub lock: LockIdentifier,
    pub mode: AccessMode,
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
