// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build locks: the per-lock semaphore and the broker that hands out instances.

mod broker;
mod resource;

pub use broker::{LockBroker, LockKey};
pub use resource::{LockWait, ResourceLock, WaiterId};
