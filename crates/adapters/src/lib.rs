// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the collaborators the admission core talks to but does not own:
//! worker transport connections, instance provisioners, and notification sinks.

pub mod connection;
pub mod notify;
pub mod provisioner;

pub use connection::{ConnectionError, DisconnectCallback, WorkerConnection};
pub use notify::{DesktopNotifyAdapter, LogNotifyAdapter, NotifyAdapter, NotifyError};
pub use provisioner::{
    provisioner_for, CommandProvisioner, InstanceProvisioner, ProvisionError, StartContext,
};

#[cfg(any(test, feature = "test-support"))]
pub use connection::{FakeConnection, RemoteCall};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use provisioner::{FakeProvisioner, ProvisionerCall};
