// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The build master's admission coordinator.
//!
//! [`BotMaster`] owns every worker proxy, the lock table and the timers
//! behind one mutex. That mutex is the admission context: each transition
//! runs to completion under it, and it is never held across an await.
//! Anything slow (remote calls, provisioning, notifications) is recorded as
//! an [`Effect`] and run after the lock is released.

mod admission;
mod connection;
mod latent;
mod notify;

pub use admission::BuildLease;
pub use connection::Disconnecting;

use crate::effect::Effect;
use crate::error::SubstantiationError;
use crate::executor::Executor;
use crate::locks::{LockBroker, LockKey};
use crate::scheduler::Scheduler;
use crate::worker::{SubstantiationState, WorkerProxy, WorkerStatus};
use bm_adapters::{provisioner_for, InstanceProvisioner, NotifyAdapter};
use bm_core::{
    Clock, Event, LockIdentifier, MasterConfig, ProvisionerConfig, TimerId, TimerKind,
    WorkerConfig, WorkerName,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

/// Builds the provisioner for a latent worker.
pub type ProvisionerFactory =
    Arc<dyn Fn(&WorkerConfig, &ProvisionerConfig) -> Arc<dyn InstanceProvisioner> + Send + Sync>;

/// Master adapter dependencies
pub struct MasterDeps<N> {
    pub notifier: N,
    pub provisioners: ProvisionerFactory,
}

impl<N> MasterDeps<N> {
    /// Provisioners come from each worker's `[provisioner]` section.
    pub fn new(notifier: N) -> Self {
        Self { notifier, provisioners: Arc::new(|_, config| provisioner_for(config)) }
    }

    pub fn with_provisioners(mut self, provisioners: ProvisionerFactory) -> Self {
        self.provisioners = provisioners;
        self
    }
}

/// Everything the admission context guards.
#[derive(Default)]
pub(crate) struct MasterState {
    pub(crate) workers: IndexMap<WorkerName, WorkerProxy>,
    pub(crate) broker: LockBroker,
    pub(crate) scheduler: Scheduler,
}

struct Shared<N, C> {
    state: Mutex<MasterState>,
    executor: Executor<N>,
    clock: C,
    provisioners: ProvisionerFactory,
    /// Bumped whenever a worker's ability to take builds may have changed.
    capacity: watch::Sender<u64>,
}

pub struct BotMaster<N, C> {
    inner: Arc<Shared<N, C>>,
}

impl<N, C> Clone for BotMaster<N, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<N, C> BotMaster<N, C>
where
    N: NotifyAdapter,
    C: Clock,
{
    /// Create a master with no workers. Call [`Self::reconfigure`] to load some.
    pub fn new(deps: MasterDeps<N>, clock: C, event_tx: mpsc::Sender<Event>) -> Self {
        let (capacity, _) = watch::channel(0);
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(MasterState::default()),
                executor: Executor::new(deps.notifier, event_tx),
                clock,
                provisioners: deps.provisioners,
                capacity,
            }),
        }
    }

    pub fn clock(&self) -> &C {
        &self.inner.clock
    }

    /// Run `f` inside the admission context, then execute the effects it recorded.
    fn with_state<R>(&self, f: impl FnOnce(&mut MasterState, &mut Vec<Effect>) -> R) -> R {
        let mut effects = Vec::new();
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state, &mut effects)
        };
        self.inner.executor.execute(effects);
        result
    }

    fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Wake anything waiting for a worker to change (admission waits, choosers).
    fn capacity_changed(&self) {
        self.inner.capacity.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Receiver that changes whenever a worker may have gained or lost capacity.
    pub fn capacity_changes(&self) -> watch::Receiver<u64> {
        self.inner.capacity.subscribe()
    }

    pub fn worker_status(&self, name: &str) -> Option<WorkerStatus> {
        self.inner.state.lock().workers.get(name).map(WorkerProxy::status)
    }

    pub fn worker_names(&self) -> Vec<WorkerName> {
        self.inner.state.lock().workers.keys().cloned().collect()
    }

    /// Whether `timer` is currently armed.
    pub fn timer_is_set(&self, timer: &TimerId) -> bool {
        self.inner.state.lock().scheduler.is_set(timer)
    }

    /// Earliest armed timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.state.lock().scheduler.next_deadline()
    }

    /// Apply a new worker and lock configuration.
    ///
    /// New workers are added, existing ones updated in place, and workers no
    /// longer configured are shut out. Locks are pruned only once idle.
    pub fn reconfigure(&self, config: MasterConfig) {
        self.with_state(|state, effects| {
            let configured: HashSet<&WorkerName> = config.workers.iter().map(|w| &w.name).collect();
            let removed: Vec<WorkerName> =
                state.workers.keys().filter(|name| !configured.contains(name)).cloned().collect();
            for name in removed {
                self.remove_worker(state, effects, &name);
            }

            for worker in &config.workers {
                let replace = state
                    .workers
                    .get(&worker.name)
                    .is_some_and(|proxy| proxy.config.is_latent() != worker.is_latent());
                if replace {
                    tracing::info!(worker = %worker.name, "worker kind changed, replacing proxy");
                    self.remove_worker(state, effects, &worker.name);
                }
                match state.workers.get_mut(&worker.name) {
                    Some(proxy) => self.update_worker(proxy, worker.clone()),
                    None => {
                        let provisioner = worker
                            .latent
                            .as_ref()
                            .map(|latent| (self.inner.provisioners)(worker, &latent.provisioner));
                        tracing::info!(worker = %worker.name, latent = worker.is_latent(), "worker added");
                        state
                            .workers
                            .insert(worker.name.clone(), WorkerProxy::new(worker.clone(), provisioner));
                    }
                }
                self.refresh_missing_timer(state, &worker.name);
            }

            let mut live: HashSet<LockIdentifier> = config.locks.iter().cloned().collect();
            live.extend(config.workers.iter().flat_map(|w| w.locks.iter().map(|a| a.lock.clone())));
            state.broker.prune(|key: &LockKey| {
                live.contains(&key.lock)
                    && key.worker.as_ref().is_none_or(|w| configured.contains(&w))
            });
        });
        self.capacity_changed();
    }

    fn update_worker(&self, proxy: &mut WorkerProxy, config: WorkerConfig) {
        let idle = proxy.connection.is_none();
        if let (Some(latent), Some(new)) = (proxy.latent.as_mut(), config.latent.as_ref()) {
            if latent.config.provisioner != new.provisioner {
                let provisioner = (self.inner.provisioners)(&config, &new.provisioner);
                if idle && latent.state == SubstantiationState::Insubstantiated {
                    latent.provisioner = provisioner;
                } else {
                    tracing::info!(worker = %config.name, "provisioner change deferred until the instance stops");
                    latent.pending_provisioner = Some(provisioner);
                }
            }
        }
        proxy.update_config(config);
    }

    fn remove_worker(&self, state: &mut MasterState, effects: &mut Vec<Effect>, name: &WorkerName) {
        let Some(mut proxy) = state.workers.shift_remove(name) else {
            return;
        };
        for timer in [TimerId::missing(name), TimerId::substantiation(name), TimerId::build_wait(name)] {
            state.scheduler.cancel_timer(&timer);
        }
        if let Some(latent) = proxy.latent.as_mut() {
            latent.resolve_waiters(Err(SubstantiationError::Aborted(name.clone())));
            if latent.state != SubstantiationState::Insubstantiated {
                effects.push(Effect::StopInstance {
                    worker: name.clone(),
                    provisioner: Arc::clone(&latent.provisioner),
                    fast: true,
                });
            }
        }
        if let Some(connection) = proxy.connection.take() {
            effects.push(Effect::CloseConnection { worker: name.clone(), connection });
        }
        for waiter in proxy.disconnect_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!(worker = %name, builds = proxy.active_builds(), "worker removed from configuration");
    }

    /// Arm or disarm the missing timer to match the worker's current state.
    fn refresh_missing_timer(&self, state: &mut MasterState, name: &WorkerName) {
        let Some(proxy) = state.workers.get(name) else {
            return;
        };
        let timer = TimerId::missing(name);
        if proxy.wants_missing_timer() {
            if !state.scheduler.is_set(&timer) {
                state.scheduler.set_timer(timer, proxy.config.missing_timeout, self.now());
            }
        } else {
            state.scheduler.cancel_timer(&timer);
        }
    }

    /// Apply one event from background work or the timer loop.
    pub fn handle_event(&self, event: Event) {
        tracing::debug!(event = event.name(), "handling event");
        match event {
            Event::InstanceStarted { worker, attempt, outcome } => {
                self.instance_started(&worker, attempt, outcome)
            }
            Event::InstanceStopped { worker, error: None } => {
                tracing::info!(%worker, "instance stopped")
            }
            Event::InstanceStopped { worker, error: Some(error) } => {
                tracing::warn!(%worker, %error, "instance stop failed")
            }
            Event::ConnectionLost { worker, connection } => self.connection_lost(&worker, &connection),
            Event::TimerFired { id } => self.timer_fired(&id),
        }
    }

    /// Fire every timer that is due. Returns how many fired.
    pub fn tick(&self) -> usize {
        let fired = self.inner.state.lock().scheduler.fired_timers(self.now());
        let count = fired.len();
        for event in fired {
            self.handle_event(event);
        }
        count
    }

    fn timer_fired(&self, id: &TimerId) {
        let Some(kind) = id.kind() else {
            tracing::warn!(timer = %id, "ignoring unknown timer");
            return;
        };
        let worker = WorkerName::new(kind.worker());
        match kind {
            TimerKind::Missing(_) => self.missing_timer_fired(&worker),
            TimerKind::Substantiation(_) => self.substantiation_timer_fired(&worker),
            TimerKind::BuildWait(_) => self.build_wait_timer_fired(&worker),
        }
    }

    fn missing_timer_fired(&self, name: &WorkerName) {
        let utc = self.inner.clock.utc();
        self.with_state(|state, effects| {
            let Some(proxy) = state.workers.get(name) else {
                return;
            };
            if !proxy.wants_missing_timer() {
                return;
            }
            tracing::warn!(worker = %name, "worker missing, notifying operators");
            let (subject, body) = notify::missing_worker(proxy, utc);
            effects.push(Effect::Notify {
                worker: name.clone(),
                subject,
                body,
                recipients: proxy.config.notify_on_missing.clone(),
            });
        });
    }

    /// Service stop: stop every latent instance and drop all timers.
    ///
    /// Waits for the provisioner stop calls to finish.
    pub async fn shutdown(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let names: Vec<WorkerName> = state.workers.keys().cloned().collect();
            for name in names {
                self.insubstantiate_worker(&mut state, &mut effects, &name, true);
            }
            state.scheduler.clear();
        }
        for handle in self.inner.executor.execute(effects) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "shutdown task failed");
            }
        }
        tracing::info!("master stopped");
    }
}

#[cfg(test)]
#[path = "../master_tests/mod.rs"]
mod tests;
