// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps configured lock identifiers to live lock instances.
//!
//! Identifiers are compared structurally, so one rebuilt from a reloaded
//! configuration resolves to the instance already in use. An identifier whose
//! limit changed is a different key and gets a fresh instance; the old one
//! keeps serving its current holders until it is idle and pruned.

use super::ResourceLock;
use bm_core::{LockIdentifier, LockScope, WorkerName};
use std::collections::HashMap;

/// Which instance of a lock a build needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub lock: LockIdentifier,
    /// Set only for worker-scoped locks.
    pub worker: Option<WorkerName>,
}

impl LockKey {
    pub fn master(lock: LockIdentifier) -> Self {
        Self { lock, worker: None }
    }

    /// Key for `lock` as used by a build on `worker`.
    ///
    /// Master-scoped locks ignore the worker.
    pub fn for_worker(lock: &LockIdentifier, worker: &WorkerName) -> Self {
        match lock.scope {
            LockScope::Master => Self::master(lock.clone()),
            LockScope::Worker => Self { lock: lock.clone(), worker: Some(worker.clone()) },
        }
    }

    fn max_count(&self) -> u32 {
        match &self.worker {
            Some(worker) => self.lock.max_count_for(worker.as_str()),
            None => self.lock.max_count,
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.worker {
            Some(worker) => write!(f, "{}@{}", self.lock.name, worker),
            None => f.write_str(&self.lock.name),
        }
    }
}

#[derive(Debug, Default)]
pub struct LockBroker {
    locks: HashMap<LockKey, ResourceLock>,
    next_instance: u64,
}

impl LockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live instance for `key`, created on first use.
    pub fn get_lock(&mut self, key: &LockKey) -> &mut ResourceLock {
        let next_instance = &mut self.next_instance;
        self.locks.entry(key.clone()).or_insert_with(|| {
            *next_instance += 1;
            tracing::debug!(lock = %key, max_count = key.max_count(), "lock instance created");
            ResourceLock::new(key.lock.name.clone(), key.max_count(), *next_instance)
        })
    }

    /// The master-wide instance of `lock`.
    pub fn get_master_lock(&mut self, lock: &LockIdentifier) -> &mut ResourceLock {
        self.get_lock(&LockKey::master(lock.clone()))
    }

    /// The instance of `lock` belonging to `worker`.
    pub fn get_worker_lock(&mut self, lock: &LockIdentifier, worker: &WorkerName) -> &mut ResourceLock {
        self.get_lock(&LockKey::for_worker(lock, worker))
    }

    /// Look up an instance without creating it.
    pub fn get(&self, key: &LockKey) -> Option<&ResourceLock> {
        self.locks.get(key)
    }

    pub fn get_mut(&mut self, key: &LockKey) -> Option<&mut ResourceLock> {
        self.locks.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop idle instances that `keep` rejects. Returns how many were dropped.
    ///
    /// Instances with holders or waiters always survive.
    pub fn prune(&mut self, keep: impl Fn(&LockKey) -> bool) -> usize {
        let before = self.locks.len();
        self.locks.retain(|key, lock| keep(key) || !lock.is_idle());
        let pruned = before - self.locks.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned stale lock instances");
        }
        pruned
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
