// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use crate::effect::Effect;
use bm_adapters::NotifyAdapter;
use bm_core::{Event, StartOutcome};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs effects, feeding results back as events.
pub(crate) struct Executor<N> {
    notifier: N,
    event_tx: mpsc::Sender<Event>,
}

impl<N: NotifyAdapter> Executor<N> {
    pub(crate) fn new(notifier: N, event_tx: mpsc::Sender<Event>) -> Self {
        Self { notifier, event_tx }
    }

    pub(crate) fn event_tx(&self) -> &mpsc::Sender<Event> {
        &self.event_tx
    }

    /// Execute effects in order. Background work is spawned; the handles let
    /// a caller wait for it when it must.
    pub(crate) fn execute(&self, effects: Vec<Effect>) -> Vec<JoinHandle<()>> {
        effects.into_iter().filter_map(|effect| self.execute_one(effect)).collect()
    }

    fn execute_one(&self, effect: Effect) -> Option<JoinHandle<()>> {
        // Format the fields as `key=val`
        let info = effect
            .fields()
            .into_iter()
            .map(|(key, val)| format!("{key}={val}"))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!("executing effect={} {}", effect.name(), info);

        if let Effect::CloseConnection { connection, .. } = &effect {
            connection.request_close();
            return None;
        }

        // Leases dropped during runtime teardown can still produce effects
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("no async runtime, dropping effect={} {}", effect.name(), info);
            return None;
        };

        let task = match effect {
            Effect::StartInstance { worker, attempt, provisioner, context } => {
                let event_tx = self.event_tx.clone();
                handle.spawn(async move {
                    let outcome = match provisioner.start(&context).await {
                        Ok(true) => StartOutcome::Launched,
                        Ok(false) => StartOutcome::Declined,
                        Err(e) => StartOutcome::Failed { reason: e.to_string() },
                    };
                    let event = Event::InstanceStarted { worker, attempt, outcome };
                    if let Err(e) = event_tx.send(event).await {
                        tracing::error!("failed to send start event: {}", e);
                    }
                })
            }

            Effect::StopInstance { worker, provisioner, fast } => {
                let event_tx = self.event_tx.clone();
                handle.spawn(async move {
                    let error = provisioner.stop(fast).await.err().map(|e| e.to_string());
                    if let Err(e) = event_tx.send(Event::InstanceStopped { worker, error }).await {
                        tracing::error!("failed to send stop event: {}", e);
                    }
                })
            }

            Effect::RequestShutdown { worker, connection } => handle.spawn(async move {
                match connection.remote_call("shutdown", Value::Null).await {
                    Ok(_) => tracing::info!(%worker, "worker accepted shutdown request"),
                    // The worker hanging up is what a successful shutdown looks like
                    Err(e) if e.is_connection_lost() => {
                        tracing::info!(%worker, "worker exited on shutdown request")
                    }
                    Err(e) => tracing::warn!(%worker, error = %e, "worker shutdown request failed"),
                }
            }),

            Effect::Notify { worker, subject, body, recipients } => {
                let notifier = self.notifier.clone();
                handle.spawn(async move {
                    if let Err(e) = notifier.send(&subject, &body, &recipients).await {
                        tracing::warn!(%worker, error = %e, "notification failed");
                    }
                })
            }

            Effect::CloseConnection { .. } => return None,
        };
        Some(task)
    }
}
