// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-core: value types shared by the build master admission core

pub mod macros;

pub mod build;
pub mod clock;
pub mod config;
pub mod event;
pub mod id;
pub mod lock;
pub mod timer;
pub mod worker;

pub use build::{BuildId, BuildRequest};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, MasterConfig, RawConfig};
pub use event::{Event, StartOutcome};
pub use id::{short, ConnectionId};
pub use lock::{AccessMode, LockAccess, LockIdentifier, LockScope};
pub use timer::{TimerId, TimerKind};
pub use worker::{LatentConfig, ProvisionerConfig, WorkerConfig, WorkerInfo, WorkerName};
