// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events fed back into the master from background work.
//!
//! Provisioner calls, remote disconnect notifications and fired timers all
//! complete outside the admission context. They report here, and the master
//! applies them one at a time.

use crate::id::ConnectionId;
use crate::timer::TimerId;
use crate::worker::WorkerName;
use serde::{Deserialize, Serialize};

/// Three-way result of asking a provisioner to start an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// The instance is booting; the worker is expected to attach.
    Launched,
    /// Not now, with no error. Expected backpressure.
    Declined,
    /// The start attempt failed.
    Failed { reason: String },
}

impl std::fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartOutcome::Launched => f.write_str("launched"),
            StartOutcome::Declined => f.write_str("declined"),
            StartOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A provisioner start call finished. `attempt` ties it to the
    /// substantiation that issued it.
    #[serde(rename = "instance:started")]
    InstanceStarted { worker: WorkerName, attempt: u64, outcome: StartOutcome },

    #[serde(rename = "instance:stopped")]
    InstanceStopped {
        worker: WorkerName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The transport reported that a worker connection went away.
    #[serde(rename = "connection:lost")]
    ConnectionLost { worker: WorkerName, connection: ConnectionId },

    #[serde(rename = "timer:fired")]
    TimerFired { id: TimerId },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::InstanceStarted { .. } => "instance:started",
            Event::InstanceStopped { .. } => "instance:stopped",
            Event::ConnectionLost { .. } => "connection:lost",
            Event::TimerFired { .. } => "timer:fired",
        }
    }
}
