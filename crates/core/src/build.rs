// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build identity and the request handed to admission control.

use crate::lock::LockAccess;
use crate::worker::WorkerName;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for one build attempt.
    ///
    /// Builds own the locks they claim, so this id is also the lock owner token.
    pub struct BuildId("bld-");
}

/// A build that has been chosen to run on a specific worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub id: BuildId,
    pub builder: String,
    pub worker: WorkerName,
    /// Locks this build needs in addition to the worker's own.
    #[serde(default)]
    pub locks: Vec<LockAccess>,
}

impl BuildRequest {
    pub fn new(builder: impl Into<String>, worker: impl Into<WorkerName>) -> Self {
        Self { id: BuildId::new(), builder: builder.into(), worker: worker.into(), locks: Vec::new() }
    }

    pub fn with_locks(mut self, locks: Vec<LockAccess>) -> Self {
        self.locks = locks;
        self
    }
}
