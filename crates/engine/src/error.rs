// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use bm_core::{AccessMode, BuildId, WorkerName};
use std::time::Duration;
use thiserror::Error;

/// Misuse of a [`crate::locks::ResourceLock`].
///
/// These indicate a caller bug. The lock state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock '{lock}' is not available for {mode} access by {owner}")]
    Unavailable { lock: String, owner: BuildId, mode: AccessMode },
    #[error("{owner} does not hold lock '{lock}' in {mode} mode")]
    NotHeld { lock: String, owner: BuildId, mode: AccessMode },
    #[error("{owner} is not waiting on lock '{lock}'")]
    NotWaiting { lock: String, owner: BuildId },
}

/// Why a latent worker could not be brought up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstantiationError {
    #[error("provisioner for worker '{0}' declined to start an instance")]
    Declined(WorkerName),
    #[error("worker '{worker}' failed to start: {reason}")]
    StartFailed { worker: WorkerName, reason: String },
    #[error("worker '{worker}' did not attach within {timeout:?}")]
    Timeout { worker: WorkerName, timeout: Duration },
    #[error("worker '{worker}' rejected its builder list: {reason}")]
    BuilderList { worker: WorkerName, reason: String },
    #[error("disconnect aborted substantiation of worker '{0}'")]
    Aborted(WorkerName),
    #[error("worker '{worker}' is backing off after a failed start, retry in {remaining:?}")]
    BackingOff { worker: WorkerName, remaining: Duration },
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),
}

/// Why an incoming connection was not attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),
    #[error("worker '{0}' connected while not substantiating")]
    Unexpected(WorkerName),
    #[error("worker '{0}' lost its connection while attaching")]
    LostDuringAttach(WorkerName),
    #[error("worker '{worker}' rejected its builder list: {reason}")]
    BuilderList { worker: WorkerName, reason: String },
}

/// Why a build could not be admitted onto a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),
    #[error("builder '{builder}' is not configured on worker '{worker}'")]
    UnknownBuilder { worker: WorkerName, builder: String },
    #[error("worker '{0}' is not connected")]
    NotConnected(WorkerName),
    #[error("worker '{0}' is shutting down")]
    Draining(WorkerName),
    #[error("worker '{worker}' has no free slot for builder '{builder}'")]
    NoCapacity { worker: WorkerName, builder: String },
    #[error("worker '{0}' went away before the build could start")]
    WorkerLost(WorkerName),
    #[error(transparent)]
    Substantiation(#[from] SubstantiationError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Errors from administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MasterError {
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),
    #[error("worker '{0}' is not connected")]
    NotConnected(WorkerName),
    #[error("worker '{0}' is not a latent worker")]
    NotLatent(WorkerName),
}
