// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admitting a chosen build onto its worker.
//!
//! Order matters: substantiate first, then take every lock the build needs
//! in one step, then occupy the builder slot. A build that cannot get a lock
//! waits for it and is never refused for it.

use super::{BotMaster, MasterState};
use crate::effect::Effect;
use crate::error::AdmissionError;
use crate::locks::{LockKey, LockWait, WaiterId};
use crate::worker::SubstantiationState;
use bm_adapters::{NotifyAdapter, StartContext};
use bm_core::{AccessMode, BuildId, BuildRequest, Clock, TimerId, WorkerName};
use indexmap::IndexMap;

enum Claim {
    Held(Vec<(LockKey, AccessMode)>),
    Wait(LockKey, LockWait),
}

impl<N, C> BotMaster<N, C>
where
    N: NotifyAdapter,
    C: Clock,
{
    /// Whether `builder` could start on `worker` right now.
    pub fn can_admit_build(&self, worker: &str, builder: &str) -> bool {
        let state = self.inner.state.lock();
        state.workers.get(worker).is_some_and(|proxy| proxy.can_admit_build(builder, &[], &state.broker))
    }

    /// Substantiate, lock, and occupy a slot for `request`.
    ///
    /// The returned lease holds everything until it is finished or dropped.
    pub async fn start_build(&self, request: BuildRequest) -> Result<BuildLease<N, C>, AdmissionError> {
        let latent = self.with_state(|state, _| {
            let latent = precheck(state, &request)?;
            if let Some(pending) = state.workers.get_mut(&request.worker).and_then(|p| p.latent.as_mut()) {
                pending.pending_admissions += 1;
            }
            Ok::<_, AdmissionError>(latent)
        })?;
        // Keeps a latent worker from being reclaimed until the build is in or gone
        let _pending = latent.then(|| PendingAdmission { master: self, worker: request.worker.clone() });
        if latent {
            let context = StartContext {
                worker: request.worker.clone(),
                builder: Some(request.builder.clone()),
                build: Some(request.id.clone()),
            };
            self.substantiate(request.worker.as_str(), context).await?;
        }

        let mut changes = self.capacity_changes();
        // The lock this build was last woken for, until it claims or moves on
        let mut woken: Option<WaitGuard<'_, N, C>> = None;
        loop {
            let claim = self.with_state(|state, _| self.try_claim(state, &request))?;
            let (key, wait) = match claim {
                Claim::Held(locks) => {
                    if let Some(guard) = woken.as_mut() {
                        guard.pass_on = false;
                    }
                    self.capacity_changed();
                    return Ok(BuildLease {
                        master: self.clone(),
                        build: request.id,
                        worker: request.worker,
                        builder: request.builder,
                        locks,
                        released: false,
                    });
                }
                Claim::Wait(key, wait) => (key, wait),
            };
            let Some(id) = wait.id() else {
                continue;
            };
            drop(woken.take());

            let mut guard =
                WaitGuard { master: self, key, owner: request.id.clone(), id: Some(id), pass_on: false };
            let signaled = wait.signaled();
            tokio::pin!(signaled);
            loop {
                tokio::select! {
                    () = &mut signaled => break,
                    changed = changes.changed() => {
                        if changed.is_err() || !self.worker_usable(&request.worker) {
                            tracing::info!(build = %request.id, worker = %request.worker, "worker lost while waiting for locks");
                            return Err(AdmissionError::WorkerLost(request.worker.clone()));
                        }
                    }
                }
            }
            // Signaled waiters are already off the queue
            guard.id = None;
            guard.pass_on = true;
            woken = Some(guard);
        }
    }

    fn worker_usable(&self, worker: &WorkerName) -> bool {
        self.inner.state.lock().workers.get(worker).is_some_and(|p| p.is_connected() && !p.is_draining())
    }

    /// Claim every lock `request` needs, or queue on the first that is taken.
    fn try_claim(&self, state: &mut MasterState, request: &BuildRequest) -> Result<Claim, AdmissionError> {
        let MasterState { workers, broker, scheduler } = state;
        let proxy = workers
            .get_mut(&request.worker)
            .ok_or_else(|| AdmissionError::WorkerLost(request.worker.clone()))?;
        if !proxy.is_connected() {
            return Err(AdmissionError::WorkerLost(request.worker.clone()));
        }
        if proxy.is_draining() {
            return Err(AdmissionError::Draining(request.worker.clone()));
        }
        if !proxy.has_free_slot(&request.builder) {
            return Err(AdmissionError::NoCapacity {
                worker: request.worker.clone(),
                builder: request.builder.clone(),
            });
        }

        // The same lock named twice is claimed once, exclusive winning
        let mut wanted: IndexMap<LockKey, AccessMode> = IndexMap::new();
        for (key, mode) in proxy.lock_keys(&request.locks) {
            let entry = wanted.entry(key).or_insert(mode);
            if mode == AccessMode::Exclusive {
                *entry = AccessMode::Exclusive;
            }
        }

        if let Some((key, mode)) = wanted.iter().find(|(key, mode)| !broker.get_lock(key).is_available(**mode)) {
            tracing::info!(build = %request.id, lock = %key, %mode, "waiting for lock");
            let wait = broker.get_lock(key).wait_until_maybe_available(&request.id, *mode);
            return Ok(Claim::Wait(key.clone(), wait));
        }

        let mut held = Vec::with_capacity(wanted.len());
        for (key, mode) in wanted {
            if let Err(e) = broker.get_lock(&key).claim(&request.id, mode) {
                tracing::error!(build = %request.id, error = %e, "claim failed after availability check");
                for (key, mode) in &held {
                    let _ = broker.get_lock(key).release(&request.id, *mode);
                }
                return Err(AdmissionError::Lock(e));
            }
            held.push((key, mode));
        }

        proxy.mark_build_started(&request.id, &request.builder);
        if proxy.latent.is_some() {
            // A busy latent worker is never reclaimed
            scheduler.cancel_timer(&TimerId::build_wait(&request.worker));
        }
        tracing::info!(
            build = %request.id,
            worker = %request.worker,
            builder = %request.builder,
            locks = held.len(),
            "build admitted"
        );
        Ok(Claim::Held(held))
    }

    fn build_finished(&self, build: &BuildId, worker: &WorkerName, locks: &[(LockKey, AccessMode)]) {
        let now = self.now();
        self.with_state(|state, effects| {
            for (key, mode) in locks {
                match state.broker.get_mut(key) {
                    Some(lock) => {
                        if let Err(e) = lock.release(build, *mode) {
                            tracing::error!(%build, error = %e, "lock release failed");
                        }
                    }
                    None => tracing::error!(%build, lock = %key, "held lock instance missing"),
                }
            }

            let MasterState { workers, scheduler, .. } = state;
            let Some(proxy) = workers.get_mut(worker) else {
                tracing::info!(%build, %worker, "build finished on a removed worker");
                return;
            };
            proxy.mark_build_finished(build);
            if let Some(latent) = &proxy.latent {
                if latent.state == SubstantiationState::Substantiated && latent.is_idle() {
                    if let Some(timeout) = latent.config.build_wait_timeout {
                        scheduler.set_timer(TimerId::build_wait(worker), timeout, now);
                    }
                }
            }
            if proxy.is_draining() && proxy.active_builds() == 0 {
                if let Some(connection) = proxy.connection.clone() {
                    effects.push(Effect::RequestShutdown { worker: worker.clone(), connection });
                }
            }
            tracing::info!(%build, %worker, "build finished");
        });
        self.capacity_changed();
    }
}

fn precheck(state: &MasterState, request: &BuildRequest) -> Result<bool, AdmissionError> {
    let proxy = state
        .workers
        .get(&request.worker)
        .ok_or_else(|| AdmissionError::UnknownWorker(request.worker.to_string()))?;
    if !proxy.slots.contains_key(&request.builder) {
        return Err(AdmissionError::UnknownBuilder {
            worker: request.worker.clone(),
            builder: request.builder.clone(),
        });
    }
    if proxy.is_draining() {
        return Err(AdmissionError::Draining(request.worker.clone()));
    }
    match proxy.latent {
        Some(_) => Ok(true),
        None if proxy.is_connected() => Ok(false),
        None => Err(AdmissionError::NotConnected(request.worker.clone())),
    }
}

/// Cancels a queued lock wait if admission is abandoned before it is signaled.
///
/// A waiter that was signaled but never claimed hands the wake on to the
/// waiters queued behind it.
struct WaitGuard<'a, N, C> {
    master: &'a BotMaster<N, C>,
    key: LockKey,
    owner: BuildId,
    id: Option<WaiterId>,
    pass_on: bool,
}

impl<N, C> Drop for WaitGuard<'_, N, C> {
    fn drop(&mut self) {
        if self.id.is_none() && !self.pass_on {
            return;
        }
        let mut state = self.master.inner.state.lock();
        let Some(lock) = state.broker.get_mut(&self.key) else {
            return;
        };
        let pass_on = match self.id.take() {
            // Already signaled if this fails
            Some(id) => lock.stop_waiting_until_available(&self.owner, id).is_err(),
            None => self.pass_on,
        };
        if pass_on {
            let signaled = lock.wake_waiters();
            tracing::debug!(build = %self.owner, lock = %self.key, signaled, "passed on unused lock wake");
        }
    }
}

/// Counts a latent worker's build as on its way in until admission ends.
struct PendingAdmission<'a, N: NotifyAdapter, C: Clock> {
    master: &'a BotMaster<N, C>,
    worker: WorkerName,
}

impl<N: NotifyAdapter, C: Clock> Drop for PendingAdmission<'_, N, C> {
    fn drop(&mut self) {
        let now = self.master.now();
        let mut state = self.master.inner.state.lock();
        let MasterState { workers, scheduler, .. } = &mut *state;
        let Some(latent) = workers.get_mut(&self.worker).and_then(|p| p.latent.as_mut()) else {
            return;
        };
        latent.pending_admissions = latent.pending_admissions.saturating_sub(1);
        // Abandoned admission: restart the idle countdown
        if latent.state == SubstantiationState::Substantiated && latent.is_idle() {
            if let Some(timeout) = latent.config.build_wait_timeout {
                scheduler.set_timer(TimerId::build_wait(&self.worker), timeout, now);
            }
        }
    }
}

/// A running build's hold on its worker slot and locks.
///
/// Everything is released exactly once: by [`BuildLease::finish`], or on drop
/// if the build ends any other way.
pub struct BuildLease<N: NotifyAdapter, C: Clock> {
    master: BotMaster<N, C>,
    build: BuildId,
    worker: WorkerName,
    builder: String,
    locks: Vec<(LockKey, AccessMode)>,
    released: bool,
}

impl<N: NotifyAdapter, C: Clock> BuildLease<N, C> {
    pub fn build_id(&self) -> &BuildId {
        &self.build
    }

    pub fn worker(&self) -> &WorkerName {
        &self.worker
    }

    pub fn builder(&self) -> &str {
        &self.builder
    }

    pub fn locks(&self) -> &[(LockKey, AccessMode)] {
        &self.locks
    }

    /// Release the slot and every lock.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        self.master.build_finished(&self.build, &self.worker, &self.locks);
    }
}

impl<N: NotifyAdapter, C: Clock> std::fmt::Debug for BuildLease<N, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildLease")
            .field("build", &self.build)
            .field("worker", &self.worker)
            .field("builder", &self.builder)
            .field("locks", &self.locks)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<N: NotifyAdapter, C: Clock> Drop for BuildLease<N, C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
