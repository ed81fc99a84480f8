// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-engine: lock admission, worker lifecycle and latent provisioning

mod effect;
pub mod error;
mod executor;
pub mod locks;
pub mod master;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{AdmissionError, AttachError, LockError, MasterError, SubstantiationError};
pub use locks::{LockBroker, LockKey, LockWait, ResourceLock, WaiterId};
pub use master::{BotMaster, BuildLease, Disconnecting, MasterDeps, ProvisionerFactory};
pub use scheduler::Scheduler;
pub use worker::{
    BuilderSlot, ConnectionState, LatentState, SubstantiationResult, SubstantiationState,
    WorkerProxy, WorkerStatus,
};
