// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Side effects decided inside the admission context.
//!
//! State transitions only record what has to happen. The effects run after
//! the state lock is released, so remote calls, provisioner calls and
//! notifications never hold up other transitions.

use bm_adapters::{InstanceProvisioner, StartContext, WorkerConnection};
use bm_core::WorkerName;
use std::sync::Arc;

pub(crate) enum Effect {
    /// Ask the provisioner for an instance. Reports `InstanceStarted`.
    StartInstance {
        worker: WorkerName,
        attempt: u64,
        provisioner: Arc<dyn InstanceProvisioner>,
        context: StartContext,
    },
    /// Tear the instance down. Reports `InstanceStopped`.
    StopInstance { worker: WorkerName, provisioner: Arc<dyn InstanceProvisioner>, fast: bool },
    /// Best-effort close; the transport reports the loss later.
    CloseConnection { worker: WorkerName, connection: Arc<dyn WorkerConnection> },
    /// Ask the worker process to exit.
    RequestShutdown { worker: WorkerName, connection: Arc<dyn WorkerConnection> },
    Notify { worker: WorkerName, subject: String, body: String, recipients: Vec<String> },
}

impl Effect {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Effect::StartInstance { .. } => "start_instance",
            Effect::StopInstance { .. } => "stop_instance",
            Effect::CloseConnection { .. } => "close_connection",
            Effect::RequestShutdown { .. } => "request_shutdown",
            Effect::Notify { .. } => "notify",
        }
    }

    pub(crate) fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::StartInstance { worker, attempt, context, .. } => {
                let mut fields = vec![("worker", worker.to_string()), ("attempt", attempt.to_string())];
                if let Some(builder) = &context.builder {
                    fields.push(("builder", builder.clone()));
                }
                if let Some(build) = &context.build {
                    fields.push(("build", build.short(12).to_string()));
                }
                fields
            }
            Effect::StopInstance { worker, fast, .. } => {
                vec![("worker", worker.to_string()), ("fast", fast.to_string())]
            }
            Effect::CloseConnection { worker, connection }
            | Effect::RequestShutdown { worker, connection } => {
                vec![("worker", worker.to_string()), ("connection", connection.id().to_string())]
            }
            Effect::Notify { worker, subject, recipients, .. } => vec![
                ("worker", worker.to_string()),
                ("subject", subject.clone()),
                ("recipients", recipients.join(",")),
            ],
        }
    }
}
