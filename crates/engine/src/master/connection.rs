// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker connection lifecycle: attach, detach, close, graceful shutdown.

use super::{BotMaster, MasterState};
use crate::effect::Effect;
use crate::error::{AttachError, MasterError, SubstantiationError};
use crate::worker::{ConnectionState, SubstantiationState};
use bm_adapters::{ConnectionError, NotifyAdapter, WorkerConnection};
use bm_core::{Clock, ConnectionId, Event, TimerId, WorkerInfo, WorkerName};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Completion handle for an administrative disconnect.
///
/// Resolves once the worker has detached, or right away if it was not
/// connected. "Probably gone": the remote side may not have confirmed.
pub struct Disconnecting {
    rx: Option<oneshot::Receiver<()>>,
}

impl Disconnecting {
    pub async fn wait(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }
}

impl<N, C> BotMaster<N, C>
where
    N: NotifyAdapter,
    C: Clock,
{
    /// Attach a freshly authenticated connection to its worker.
    ///
    /// An existing connection is superseded and closed without waiting for
    /// it. Info exchange failures leave fields unknown; they never fail the
    /// attach. The worker only counts as connected once the exchange is done.
    pub async fn attach(
        &self,
        worker: &str,
        connection: Arc<dyn WorkerConnection>,
    ) -> Result<(), AttachError> {
        let (name, builders) =
            self.with_state(|state, effects| self.begin_attach(state, effects, worker, &connection))?;

        let event_tx = self.inner.executor.event_tx().clone();
        let (lost_worker, lost_connection) = (name.clone(), connection.id().clone());
        // The transport may call back from any thread, so keep hold of the runtime
        let runtime = Handle::try_current().ok();
        connection.notify_on_disconnect(Box::new(move || {
            let event = Event::ConnectionLost { worker: lost_worker, connection: lost_connection };
            match runtime {
                // Waits for room in the event channel rather than dropping the loss
                Some(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = event_tx.send(event).await {
                            tracing::error!("failed to send connection lost event: {}", e);
                        }
                    });
                }
                None => {
                    if let Err(e) = event_tx.try_send(event) {
                        tracing::error!("failed to send connection lost event: {}", e);
                    }
                }
            }
        }));

        let info = exchange_info(&name, connection.as_ref()).await;
        let builder_list = connection.remote_call("setBuilderList", builder_list(&builders)).await;

        let result = self.with_state(|state, effects| {
            self.finish_attach(state, effects, &name, &connection, info, builder_list)
        });
        if result.is_ok() {
            self.capacity_changed();
        }
        result
    }

    fn begin_attach(
        &self,
        state: &mut MasterState,
        effects: &mut Vec<Effect>,
        worker: &str,
        connection: &Arc<dyn WorkerConnection>,
    ) -> Result<(WorkerName, Vec<String>), AttachError> {
        let Some(proxy) = state.workers.get_mut(worker) else {
            tracing::warn!(%worker, connection = %connection.id(), "connection for unknown worker");
            effects.push(Effect::CloseConnection {
                worker: WorkerName::new(worker),
                connection: Arc::clone(connection),
            });
            return Err(AttachError::UnknownWorker(worker.to_string()));
        };
        let name = proxy.name().clone();

        if let Some(latent) = &proxy.latent {
            let expected = latent.state == SubstantiationState::Substantiating
                || latent.accepts_unrequested_attach();
            if !expected {
                tracing::warn!(
                    worker = %name,
                    state = %latent.state,
                    "worker connected while not substantiating, disconnecting it"
                );
                effects.push(Effect::CloseConnection {
                    worker: name.clone(),
                    connection: Arc::clone(connection),
                });
                return Err(AttachError::Unexpected(name));
            }
        }

        if let Some(old) = proxy.connection.take() {
            if old.id() != connection.id() {
                tracing::info!(
                    worker = %name,
                    old = %old.id(),
                    new = %connection.id(),
                    "new connection supersedes the current one"
                );
                proxy.last_disconnected = Some(self.inner.clock.utc());
                for waiter in proxy.disconnect_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                effects.push(Effect::CloseConnection { worker: name.clone(), connection: old });
            }
        }
        proxy.connection = Some(Arc::clone(connection));
        proxy.state = ConnectionState::Attaching;
        tracing::info!(worker = %name, connection = %connection.id(), "worker attaching");
        Ok((name, proxy.config.builders.clone()))
    }

    fn finish_attach(
        &self,
        state: &mut MasterState,
        effects: &mut Vec<Effect>,
        name: &WorkerName,
        connection: &Arc<dyn WorkerConnection>,
        info: WorkerInfo,
        builder_list: Result<Value, ConnectionError>,
    ) -> Result<(), AttachError> {
        let now = self.now();
        let MasterState { workers, scheduler, .. } = &mut *state;
        let Some(proxy) = workers.get_mut(name) else {
            effects.push(Effect::CloseConnection { worker: name.clone(), connection: Arc::clone(connection) });
            return Err(AttachError::LostDuringAttach(name.clone()));
        };
        // Superseded or detached while the exchange ran
        if proxy.connection_id() != Some(connection.id()) {
            return Err(AttachError::LostDuringAttach(name.clone()));
        }

        match builder_list {
            Ok(_) => {}
            Err(e) if e.is_connection_lost() => {
                return Err(AttachError::LostDuringAttach(name.clone()));
            }
            Err(e) if proxy.latent.is_some() => {
                let reason = e.to_string();
                tracing::warn!(worker = %name, error = %reason, "latent worker rejected its builder list");
                let error = SubstantiationError::BuilderList { worker: name.clone(), reason: reason.clone() };
                self.substantiation_failed(state, effects, name, error);
                return Err(AttachError::BuilderList { worker: name.clone(), reason });
            }
            Err(e) => tracing::warn!(worker = %name, error = %e, "failed to send builder list"),
        }

        if let Some(latent) = &proxy.latent {
            // Insubstantiated while the exchange ran
            if latent.state != SubstantiationState::Substantiating && !latent.accepts_unrequested_attach() {
                effects.push(Effect::CloseConnection { worker: name.clone(), connection: Arc::clone(connection) });
                return Err(AttachError::Unexpected(name.clone()));
            }
        }

        proxy.info = info;
        proxy.state = ConnectionState::Connected;
        proxy.last_connected = Some(self.inner.clock.utc());
        scheduler.cancel_timer(&TimerId::missing(name));

        if let Some(latent) = proxy.latent.as_mut() {
            latent.state = SubstantiationState::Substantiated;
            latent.deferred_start = None;
            latent.backoff_until = None;
            latent.substantiating_since = None;
            scheduler.cancel_timer(&TimerId::substantiation(name));
            let resolved = latent.resolve_waiters(Ok(()));
            if latent.is_idle() {
                if let Some(timeout) = latent.config.build_wait_timeout {
                    scheduler.set_timer(TimerId::build_wait(name), timeout, now);
                }
            }
            tracing::info!(worker = %name, waiters = resolved, "worker substantiated");
        }
        tracing::info!(
            worker = %name,
            connection = %connection.id(),
            version = proxy.info.version.as_deref().unwrap_or("unknown"),
            "worker attached"
        );
        Ok(())
    }

    /// Forget the worker's connection.
    ///
    /// Safe to call any number of times; only the first call after an attach
    /// changes anything.
    pub fn detach(&self, worker: &str) {
        let detached = self.with_state(|state, effects| self.detach_worker(state, effects, worker));
        if detached {
            self.capacity_changed();
        }
    }

    /// Transport callback path: detach only if `connection` is still current.
    pub(crate) fn connection_lost(&self, worker: &WorkerName, connection: &ConnectionId) {
        let detached = self.with_state(|state, effects| {
            let current = state.workers.get(worker).and_then(|p| p.connection_id().cloned());
            if current.as_ref() != Some(connection) {
                tracing::debug!(%worker, %connection, "ignoring loss of a superseded connection");
                return false;
            }
            self.detach_worker(state, effects, worker.as_str())
        });
        if detached {
            self.capacity_changed();
        }
    }

    fn detach_worker(&self, state: &mut MasterState, effects: &mut Vec<Effect>, worker: &str) -> bool {
        let Some(proxy) = state.workers.get_mut(worker) else {
            return false;
        };
        let Some(connection) = proxy.connection.take() else {
            return false;
        };
        let name = proxy.name().clone();
        proxy.state = ConnectionState::Disconnected;
        proxy.draining = false;
        proxy.last_disconnected = Some(self.inner.clock.utc());
        for waiter in proxy.disconnect_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!(worker = %name, connection = %connection.id(), "worker detached");

        let mut lost_substantiated = false;
        if let Some(latent) = proxy.latent.as_mut() {
            match latent.state {
                SubstantiationState::Substantiating => {
                    if let Some(context) = latent.deferred_start.take() {
                        tracing::info!(worker = %name, "previous connection gone, starting instance");
                        effects.push(Effect::StartInstance {
                            worker: name.clone(),
                            attempt: latent.attempt,
                            provisioner: Arc::clone(&latent.provisioner),
                            context,
                        });
                    }
                }
                SubstantiationState::Substantiated => lost_substantiated = true,
                SubstantiationState::Insubstantiated => {}
            }
        }
        if lost_substantiated {
            tracing::warn!(worker = %name, "substantiated worker lost its connection");
            self.insubstantiate_worker(state, effects, &name, false);
        }
        self.refresh_missing_timer(state, &name);
        true
    }

    /// Ask the transport to close the worker's connection.
    ///
    /// State does not change here; the detach follows when the transport
    /// reports the loss.
    pub fn disconnect(&self, worker: &str) -> Result<Disconnecting, MasterError> {
        self.with_state(|state, effects| {
            let proxy = state
                .workers
                .get_mut(worker)
                .ok_or_else(|| MasterError::UnknownWorker(worker.to_string()))?;
            let Some(connection) = proxy.connection.clone() else {
                return Ok(Disconnecting { rx: None });
            };
            let (tx, rx) = oneshot::channel();
            proxy.disconnect_waiters.push(tx);
            effects.push(Effect::CloseConnection { worker: proxy.name().clone(), connection });
            Ok(Disconnecting { rx: Some(rx) })
        })
    }

    /// Stop taking builds on `worker` and ask it to exit once idle.
    pub fn request_shutdown_graceful(&self, worker: &str) -> Result<(), MasterError> {
        self.with_state(|state, effects| {
            let proxy = state
                .workers
                .get_mut(worker)
                .ok_or_else(|| MasterError::UnknownWorker(worker.to_string()))?;
            let Some(connection) = proxy.connection.clone() else {
                return Err(MasterError::NotConnected(proxy.name().clone()));
            };
            proxy.draining = true;
            tracing::info!(worker = %proxy.name(), builds = proxy.active_builds(), "graceful shutdown requested");
            if proxy.active_builds() == 0 {
                effects.push(Effect::RequestShutdown { worker: proxy.name().clone(), connection });
            }
            Ok(())
        })?;
        self.capacity_changed();
        Ok(())
    }
}

/// Best-effort worker info exchange.
///
/// Newer workers answer `getWorkerInfo` with everything at once; older ones
/// only know `getCommands` and `getVersion`. Whatever fails stays unknown.
async fn exchange_info(worker: &WorkerName, connection: &dyn WorkerConnection) -> WorkerInfo {
    let mut info = match connection.remote_call("getWorkerInfo", Value::Null).await {
        Ok(value) => parse_worker_info(&value),
        Err(e) => {
            tracing::debug!(%worker, error = %e, "getWorkerInfo failed, falling back");
            WorkerInfo::default()
        }
    };
    if info.commands.is_none() {
        match connection.remote_call("getCommands", Value::Null).await {
            Ok(value) => info.commands = parse_commands(&value),
            Err(e) => tracing::debug!(%worker, error = %e, "getCommands failed"),
        }
    }
    if info.version.is_none() {
        match connection.remote_call("getVersion", Value::Null).await {
            Ok(value) => info.version = value.as_str().map(str::to_string),
            Err(e) => tracing::debug!(%worker, error = %e, "getVersion failed"),
        }
    }
    info
}

fn parse_worker_info(value: &Value) -> WorkerInfo {
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    WorkerInfo {
        admin: field("admin"),
        host: field("host"),
        access_uri: field("access_uri"),
        version: field("version"),
        commands: value.get("worker_commands").and_then(parse_commands),
    }
}

fn parse_commands(value: &Value) -> Option<BTreeMap<String, String>> {
    let commands = value.as_object()?;
    Some(
        commands
            .iter()
            .map(|(name, version)| {
                let version = match version {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), version)
            })
            .collect(),
    )
}

/// `setBuilderList` arguments: `[name, directory]` pairs.
fn builder_list(builders: &[String]) -> Value {
    Value::Array(builders.iter().map(|b| json!([b, b])).collect())
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
