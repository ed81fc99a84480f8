// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning state carried by latent workers.

use crate::error::SubstantiationError;
use bm_adapters::{InstanceProvisioner, StartContext};
use bm_core::LatentConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub type SubstantiationResult = Result<(), SubstantiationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstantiationState {
    Insubstantiated,
    Substantiating,
    Substantiated,
}

bm_core::simple_display! {
    SubstantiationState {
        Insubstantiated => "insubstantiated",
        Substantiating => "substantiating",
        Substantiated => "substantiated",
    }
}

pub struct LatentState {
    pub(crate) config: LatentConfig,
    pub(crate) provisioner: Arc<dyn InstanceProvisioner>,
    /// Replacement from a reconfiguration, swapped in once the current
    /// instance has been told to stop.
    pub(crate) pending_provisioner: Option<Arc<dyn InstanceProvisioner>>,
    pub(crate) state: SubstantiationState,
    pub(crate) waiters: Vec<oneshot::Sender<SubstantiationResult>>,
    /// Bumped on every new substantiation and every insubstantiation, so a
    /// start result from an abandoned attempt can be recognized.
    pub(crate) attempt: u64,
    /// Start held back until the previous connection finishes detaching.
    pub(crate) deferred_start: Option<StartContext>,
    pub(crate) active_builders: BTreeSet<String>,
    /// Builds between substantiation and taking their slot, e.g. queued on a lock.
    pub(crate) pending_admissions: usize,
    pub(crate) backoff_until: Option<Instant>,
    pub(crate) substantiating_since: Option<DateTime<Utc>>,
}

impl LatentState {
    pub fn new(config: LatentConfig, provisioner: Arc<dyn InstanceProvisioner>) -> Self {
        Self {
            config,
            provisioner,
            pending_provisioner: None,
            state: SubstantiationState::Insubstantiated,
            waiters: Vec::new(),
            attempt: 0,
            deferred_start: None,
            active_builders: BTreeSet::new(),
            pending_admissions: 0,
            backoff_until: None,
            substantiating_since: None,
        }
    }

    pub fn state(&self) -> SubstantiationState {
        self.state
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn active_builders(&self) -> &BTreeSet<String> {
        &self.active_builders
    }

    pub fn pending_admissions(&self) -> usize {
        self.pending_admissions
    }

    /// Nothing running and nothing on its way in.
    pub fn is_idle(&self) -> bool {
        self.active_builders.is_empty() && self.pending_admissions == 0
    }

    pub fn build_wait_timeout(&self) -> Option<Duration> {
        self.config.build_wait_timeout
    }

    /// A keep-forever worker accepts an unrequested attach.
    pub fn accepts_unrequested_attach(&self) -> bool {
        self.config.build_wait_timeout.is_none()
    }

    /// Move to `Substantiating` for a new attempt and return its number.
    pub(crate) fn begin(&mut self, now: DateTime<Utc>) -> u64 {
        self.state = SubstantiationState::Substantiating;
        self.attempt += 1;
        self.substantiating_since = Some(now);
        self.attempt
    }

    /// Join the current attempt's waiters.
    pub(crate) fn join(&mut self) -> oneshot::Receiver<SubstantiationResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Complete every waiter with `result`. Returns how many were waiting.
    pub(crate) fn resolve_waiters(&mut self, result: SubstantiationResult) -> usize {
        let waiters = std::mem::take(&mut self.waiters);
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        count
    }

    /// Time left before another start may be attempted.
    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.backoff_until.and_then(|until| until.checked_duration_since(now)).filter(|d| !d.is_zero())
    }

    /// Record a declined or failed start for backoff purposes.
    pub(crate) fn note_failed_start(&mut self, now: Instant) {
        self.backoff_until = self.config.start_retry_backoff.map(|backoff| now + backoff);
    }
}

#[cfg(test)]
#[path = "latent_tests.rs"]
mod tests;
