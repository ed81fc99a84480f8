// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master-side representative of one configured worker.
//!
//! A proxy only holds state. Everything that changes it runs inside the
//! master's admission context, which also owns the timers and lock table the
//! proxy refers to.

mod latent;

pub use latent::{LatentState, SubstantiationResult, SubstantiationState};

use crate::locks::{LockBroker, LockKey};
use bm_adapters::{InstanceProvisioner, WorkerConnection};
use bm_core::{
    AccessMode, BuildId, ConnectionId, LockAccess, WorkerConfig, WorkerInfo, WorkerName,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    /// Connection accepted, info exchange still running.
    Attaching,
    Connected,
}

bm_core::simple_display! {
    ConnectionState {
        Disconnected => "disconnected",
        Attaching => "attaching",
        Connected => "connected",
    }
}

/// One builder's place on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderSlot {
    pub builder: String,
    pub busy: bool,
}

pub struct WorkerProxy {
    pub(crate) config: WorkerConfig,
    pub(crate) connection: Option<Arc<dyn WorkerConnection>>,
    pub(crate) state: ConnectionState,
    pub(crate) info: WorkerInfo,
    pub(crate) slots: IndexMap<String, BuilderSlot>,
    /// Running builds and the builder each occupies.
    pub(crate) builds: IndexMap<BuildId, String>,
    pub(crate) draining: bool,
    pub(crate) last_connected: Option<DateTime<Utc>>,
    pub(crate) last_disconnected: Option<DateTime<Utc>>,
    pub(crate) disconnect_waiters: Vec<oneshot::Sender<()>>,
    pub(crate) latent: Option<LatentState>,
}

impl WorkerProxy {
    /// `provisioner` is only used when the config marks the worker latent.
    pub fn new(config: WorkerConfig, provisioner: Option<Arc<dyn InstanceProvisioner>>) -> Self {
        let latent = match (&config.latent, provisioner) {
            (Some(latent), Some(provisioner)) => Some(LatentState::new(latent.clone(), provisioner)),
            _ => None,
        };
        let slots = config
            .builders
            .iter()
            .map(|b| (b.clone(), BuilderSlot { builder: b.clone(), busy: false }))
            .collect();
        Self {
            config,
            connection: None,
            state: ConnectionState::Disconnected,
            info: WorkerInfo::default(),
            slots,
            builds: IndexMap::new(),
            draining: false,
            last_connected: None,
            last_disconnected: None,
            disconnect_waiters: Vec::new(),
            latent,
        }
    }

    pub fn name(&self) -> &WorkerName {
        &self.config.name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection.as_ref().map(|c| c.id())
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    pub fn latent(&self) -> Option<&LatentState> {
        self.latent.as_ref()
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn active_builds(&self) -> usize {
        self.builds.len()
    }

    /// The missing timer runs only for a disconnected always-on worker that
    /// has someone to tell. Latent workers are expected to be absent.
    pub fn wants_missing_timer(&self) -> bool {
        self.latent.is_none()
            && self.state == ConnectionState::Disconnected
            && self.config.wants_missing_timer()
    }

    /// An idle slot for `builder` and room under `max_builds`.
    pub fn has_free_slot(&self, builder: &str) -> bool {
        let under_limit = self.config.max_builds.is_none_or(|max| self.builds.len() < max as usize);
        under_limit && self.slots.get(builder).is_some_and(|slot| !slot.busy)
    }

    /// Every lock a build of this worker must hold, resolved to broker keys.
    pub fn lock_keys(&self, extra: &[LockAccess]) -> Vec<(LockKey, AccessMode)> {
        self.config
            .locks
            .iter()
            .chain(extra)
            .map(|access| (LockKey::for_worker(&access.lock, self.name()), access.mode))
            .collect()
    }

    /// Connected, not draining, a free slot, and every lock available now.
    ///
    /// A lock with no instance yet has no holders, so it counts as available.
    pub fn can_admit_build(&self, builder: &str, extra: &[LockAccess], broker: &LockBroker) -> bool {
        self.is_connected()
            && !self.draining
            && self.has_free_slot(builder)
            && self
                .lock_keys(extra)
                .iter()
                .all(|(key, mode)| broker.get(key).is_none_or(|lock| lock.is_available(*mode)))
    }

    pub(crate) fn mark_build_started(&mut self, build: &BuildId, builder: &str) {
        if let Some(slot) = self.slots.get_mut(builder) {
            slot.busy = true;
        }
        self.builds.insert(build.clone(), builder.to_string());
        if let Some(latent) = &mut self.latent {
            latent.active_builders.insert(builder.to_string());
        }
    }

    /// Free the slot held by `build`. Returns the builder it ran, if it was known.
    pub(crate) fn mark_build_finished(&mut self, build: &BuildId) -> Option<String> {
        let builder = self.builds.shift_remove(build)?;
        let retired = !self.config.builders.contains(&builder);
        if retired {
            self.slots.shift_remove(&builder);
        } else if let Some(slot) = self.slots.get_mut(&builder) {
            slot.busy = false;
        }
        if let Some(latent) = &mut self.latent {
            latent.active_builders.remove(&builder);
        }
        Some(builder)
    }

    /// Swap in a new configuration, keeping busy slots until their builds finish.
    pub(crate) fn update_config(&mut self, config: WorkerConfig) {
        let mut slots: IndexMap<String, BuilderSlot> = config
            .builders
            .iter()
            .map(|b| {
                let busy = self.slots.get(b).is_some_and(|s| s.busy);
                (b.clone(), BuilderSlot { builder: b.clone(), busy })
            })
            .collect();
        for (builder, slot) in &self.slots {
            if slot.busy && !slots.contains_key(builder) {
                slots.insert(builder.clone(), slot.clone());
            }
        }
        self.slots = slots;
        if let (Some(latent), Some(latent_config)) = (&mut self.latent, &config.latent) {
            latent.config = latent_config.clone();
        }
        self.config = config;
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            name: self.name().clone(),
            connection: self.state,
            connection_id: self.connection_id().cloned(),
            substantiation: self.latent.as_ref().map(|l| l.state),
            draining: self.draining,
            slots: self.slots.values().cloned().collect(),
            active_builds: self.builds.len(),
            info: self.info.clone(),
            last_connected: self.last_connected,
            last_disconnected: self.last_disconnected,
        }
    }
}

/// Point-in-time view of a worker for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub name: WorkerName,
    pub connection: ConnectionState,
    pub connection_id: Option<ConnectionId>,
    pub substantiation: Option<SubstantiationState>,
    pub draining: bool,
    pub slots: Vec<BuilderSlot>,
    pub active_builds: usize,
    pub info: WorkerInfo,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
