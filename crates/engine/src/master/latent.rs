// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Latent worker lifecycle: substantiate, insubstantiate, and the timers
//! and start results that drive them.

use super::{notify, BotMaster, MasterState};
use crate::effect::Effect;
use crate::error::{MasterError, SubstantiationError};
use crate::worker::{SubstantiationResult, SubstantiationState};
use bm_adapters::{NotifyAdapter, StartContext};
use bm_core::{Clock, StartOutcome, TimerId, WorkerName};
use std::sync::Arc;
use tokio::sync::oneshot;

impl<N, C> BotMaster<N, C>
where
    N: NotifyAdapter,
    C: Clock,
{
    /// Bring a latent worker up and wait until it has attached.
    ///
    /// Concurrent calls share one provisioning attempt and all resolve with
    /// its outcome. Always-on workers return immediately.
    pub async fn substantiate(&self, worker: &str, context: StartContext) -> SubstantiationResult {
        let waiter =
            self.with_state(|state, effects| self.begin_substantiation(state, effects, worker, context))?;
        match waiter {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(SubstantiationError::Aborted(WorkerName::new(worker)))),
            None => Ok(()),
        }
    }

    fn begin_substantiation(
        &self,
        state: &mut MasterState,
        effects: &mut Vec<Effect>,
        worker: &str,
        context: StartContext,
    ) -> Result<Option<oneshot::Receiver<SubstantiationResult>>, SubstantiationError> {
        let now = self.now();
        let MasterState { workers, scheduler, .. } = state;
        let proxy = workers
            .get_mut(worker)
            .ok_or_else(|| SubstantiationError::UnknownWorker(worker.to_string()))?;
        let name = proxy.name().clone();
        let has_connection = proxy.connection.is_some();
        let Some(latent) = proxy.latent.as_mut() else {
            return Ok(None);
        };

        match latent.state {
            SubstantiationState::Substantiated => {
                if latent.is_idle() {
                    if let Some(timeout) = latent.config.build_wait_timeout {
                        scheduler.set_timer(TimerId::build_wait(&name), timeout, now);
                    }
                }
                Ok(None)
            }
            SubstantiationState::Substantiating => Ok(Some(latent.join())),
            SubstantiationState::Insubstantiated => {
                if let Some(remaining) = latent.backoff_remaining(now) {
                    return Err(SubstantiationError::BackingOff { worker: name, remaining });
                }
                let attempt = latent.begin(self.inner.clock.utc());
                let rx = latent.join();
                scheduler.set_timer(TimerId::substantiation(&name), latent.config.substantiation_timeout, now);
                if has_connection {
                    tracing::info!(worker = %name, attempt, "waiting for previous connection to detach before starting");
                    latent.deferred_start = Some(context);
                } else {
                    effects.push(Effect::StartInstance {
                        worker: name.clone(),
                        attempt,
                        provisioner: Arc::clone(&latent.provisioner),
                        context,
                    });
                }
                tracing::info!(worker = %name, attempt, "substantiating");
                Ok(Some(rx))
            }
        }
    }

    pub(crate) fn instance_started(&self, worker: &WorkerName, attempt: u64, outcome: StartOutcome) {
        let now = self.now();
        self.with_state(|state, effects| {
            let Some(latent) = state.workers.get_mut(worker).and_then(|p| p.latent.as_mut()) else {
                return;
            };
            if latent.attempt != attempt || latent.state != SubstantiationState::Substantiating {
                tracing::debug!(%worker, attempt, current = latent.attempt, %outcome, "ignoring stale start result");
                return;
            }
            match outcome {
                StartOutcome::Launched => {
                    tracing::info!(%worker, attempt, "instance launched, waiting for worker to attach");
                }
                StartOutcome::Declined => {
                    latent.note_failed_start(now);
                    latent.state = SubstantiationState::Insubstantiated;
                    latent.substantiating_since = None;
                    let waiters = latent.resolve_waiters(Err(SubstantiationError::Declined(worker.clone())));
                    state.scheduler.cancel_timer(&TimerId::substantiation(worker));
                    tracing::info!(%worker, attempt, waiters, "provisioner declined to start an instance");
                }
                StartOutcome::Failed { reason } => {
                    latent.note_failed_start(now);
                    let error = SubstantiationError::StartFailed { worker: worker.clone(), reason };
                    self.substantiation_failed(state, effects, worker, error);
                }
            }
        });
    }

    pub(super) fn substantiation_timer_fired(&self, worker: &WorkerName) {
        self.with_state(|state, effects| {
            let Some(latent) = state.workers.get(worker).and_then(|p| p.latent.as_ref()) else {
                return;
            };
            if latent.state != SubstantiationState::Substantiating {
                return;
            }
            let timeout = latent.config.substantiation_timeout;
            self.substantiation_failed(
                state,
                effects,
                worker,
                SubstantiationError::Timeout { worker: worker.clone(), timeout },
            );
        });
    }

    pub(super) fn build_wait_timer_fired(&self, worker: &WorkerName) {
        self.with_state(|state, effects| {
            let idle = state
                .workers
                .get(worker)
                .and_then(|p| p.latent.as_ref())
                .is_some_and(|l| l.state == SubstantiationState::Substantiated && l.is_idle());
            if idle {
                tracing::info!(%worker, "latent worker idle, reclaiming instance");
                self.insubstantiate_worker(state, effects, worker, false);
            }
        });
    }

    /// Fail every waiter with `error`, tear the instance down, and tell
    /// operators if anyone is listening.
    pub(super) fn substantiation_failed(
        &self,
        state: &mut MasterState,
        effects: &mut Vec<Effect>,
        worker: &WorkerName,
        error: SubstantiationError,
    ) {
        let Some(proxy) = state.workers.get_mut(worker) else {
            return;
        };
        let Some(latent) = proxy.latent.as_mut() else {
            return;
        };
        let since = latent.substantiating_since;
        let waiters = latent.resolve_waiters(Err(error.clone()));
        tracing::warn!(%worker, error = %error, waiters, "substantiation failed");

        self.insubstantiate_worker(state, effects, worker, false);

        let Some(proxy) = state.workers.get(worker) else {
            return;
        };
        if !proxy.config.notify_on_missing.is_empty() {
            let (subject, body) = notify::never_substantiated(proxy, &error, since, self.inner.clock.utc());
            effects.push(Effect::Notify {
                worker: worker.clone(),
                subject,
                body,
                recipients: proxy.config.notify_on_missing.clone(),
            });
        }
    }

    /// Tear a latent worker's instance down and return it to `Insubstantiated`.
    ///
    /// Pending waiters fail, builds believed active are forgotten, and the
    /// provisioner is told to stop whether or not a connection existed.
    pub(super) fn insubstantiate_worker(
        &self,
        state: &mut MasterState,
        effects: &mut Vec<Effect>,
        worker: &WorkerName,
        fast: bool,
    ) {
        let MasterState { workers, scheduler, .. } = state;
        let Some(proxy) = workers.get_mut(worker) else {
            return;
        };
        let connection = proxy.connection.clone();
        let Some(latent) = proxy.latent.as_mut() else {
            return;
        };
        if latent.state == SubstantiationState::Insubstantiated && connection.is_none() {
            return;
        }

        let aborted = latent.resolve_waiters(Err(SubstantiationError::Aborted(worker.clone())));
        if !latent.active_builders.is_empty() {
            tracing::warn!(
                %worker,
                builders = ?latent.active_builders,
                "insubstantiating with builds still believed active"
            );
            latent.active_builders.clear();
        }
        latent.state = SubstantiationState::Insubstantiated;
        latent.attempt += 1;
        latent.deferred_start = None;
        latent.substantiating_since = None;
        scheduler.cancel_timer(&TimerId::substantiation(worker));
        scheduler.cancel_timer(&TimerId::build_wait(worker));

        if let Some(connection) = connection {
            effects.push(Effect::CloseConnection { worker: worker.clone(), connection });
        }
        effects.push(Effect::StopInstance {
            worker: worker.clone(),
            provisioner: Arc::clone(&latent.provisioner),
            fast,
        });
        if let Some(provisioner) = latent.pending_provisioner.take() {
            latent.provisioner = provisioner;
        }
        tracing::info!(%worker, fast, aborted, "insubstantiating");
    }

    /// Administrative stop of a latent worker's instance.
    pub fn insubstantiate(&self, worker: &str) -> Result<(), MasterError> {
        self.with_state(|state, effects| {
            let proxy =
                state.workers.get(worker).ok_or_else(|| MasterError::UnknownWorker(worker.to_string()))?;
            if proxy.latent.is_none() {
                return Err(MasterError::NotLatent(proxy.name().clone()));
            }
            let name = proxy.name().clone();
            self.insubstantiate_worker(state, effects, &name, true);
            Ok(())
        })?;
        self.capacity_changed();
        Ok(())
    }
}

#[cfg(test)]
#[path = "latent_tests.rs"]
mod tests;
