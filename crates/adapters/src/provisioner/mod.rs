// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance provisioners for latent workers.
//!
//! A provisioner knows how to bring the machine behind a latent worker up
//! and down, nothing more. Whether the worker process on that machine ever
//! connects is tracked by the master, not here.

mod command;

pub use command::CommandProvisioner;

use async_trait::async_trait;
use bm_core::{BuildId, ProvisionerConfig, WorkerName};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from provisioner operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("start failed: {0}")]
    StartFailed(String),
    #[error("stop failed: {0}")]
    StopFailed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// What the provisioner is told about the build that triggered a start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartContext {
    pub worker: WorkerName,
    pub builder: Option<String>,
    pub build: Option<BuildId>,
}

impl StartContext {
    pub fn new(worker: WorkerName) -> Self {
        Self { worker, builder: None, build: None }
    }
}

#[async_trait]
pub trait InstanceProvisioner: Send + Sync + 'static {
    /// Start the instance.
    ///
    /// `Ok(true)` means the instance is booting and its worker should attach
    /// soon. `Ok(false)` means the provisioner declined for now without an
    /// error (quota, capacity); callers treat it as backpressure.
    async fn start(&self, ctx: &StartContext) -> Result<bool, ProvisionError>;

    /// Stop the instance. `fast` skips any graceful shutdown the backend offers.
    async fn stop(&self, fast: bool) -> Result<(), ProvisionError>;
}

/// Build the provisioner described by `config`.
pub fn provisioner_for(config: &ProvisionerConfig) -> Arc<dyn InstanceProvisioner> {
    match config {
        ProvisionerConfig::Command { start, stop, timeout_secs } => Arc::new(
            CommandProvisioner::new(start.clone(), stop.clone(), Duration::from_secs(*timeout_secs)),
        ),
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{InstanceProvisioner, ProvisionError, StartContext};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Recorded provisioner call
    #[derive(Debug, Clone, PartialEq)]
    pub enum ProvisionerCall {
        Start(StartContext),
        Stop { fast: bool },
    }

    #[derive(Default)]
    struct FakeProvisionerState {
        calls: Vec<ProvisionerCall>,
        /// Consumed front to back; empty means launched.
        start_results: VecDeque<Result<bool, String>>,
    }

    /// Provisioner that records calls and answers from a script.
    #[derive(Clone, Default)]
    pub struct FakeProvisioner {
        inner: Arc<Mutex<FakeProvisionerState>>,
    }

    impl FakeProvisioner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the answer for the next unanswered `start`.
        pub fn push_start(&self, result: Result<bool, &str>) {
            self.inner.lock().start_results.push_back(result.map_err(str::to_string));
        }

        pub fn calls(&self) -> Vec<ProvisionerCall> {
            self.inner.lock().calls.clone()
        }

        pub fn start_count(&self) -> usize {
            self.inner
                .lock()
                .calls
                .iter()
                .filter(|c| matches!(c, ProvisionerCall::Start(_)))
                .count()
        }

        /// The `fast` flag of every stop call, in order.
        pub fn stops(&self) -> Vec<bool> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    ProvisionerCall::Stop { fast } => Some(*fast),
                    ProvisionerCall::Start(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl InstanceProvisioner for FakeProvisioner {
        async fn start(&self, ctx: &StartContext) -> Result<bool, ProvisionError> {
            let mut state = self.inner.lock();
            state.calls.push(ProvisionerCall::Start(ctx.clone()));
            state.start_results.pop_front().unwrap_or(Ok(true)).map_err(ProvisionError::StartFailed)
        }

        async fn stop(&self, fast: bool) -> Result<(), ProvisionError> {
            self.inner.lock().calls.push(ProvisionerCall::Stop { fast });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProvisioner, ProvisionerCall};
