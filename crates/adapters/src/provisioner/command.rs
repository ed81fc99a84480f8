// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioner that shells out to operator-supplied scripts.
//!
//! Start exit codes: 0 launched, 75 (`EX_TEMPFAIL`) declined, anything else
//! is an error carrying the script's stderr.

use super::{InstanceProvisioner, ProvisionError, StartContext};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Exit status a start script uses to decline without failing.
pub const EXIT_DECLINED: i32 = 75;

#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    start_command: String,
    stop_command: String,
    timeout: Duration,
}

impl CommandProvisioner {
    pub fn new(start_command: String, stop_command: String, timeout: Duration) -> Self {
        Self { start_command, stop_command, timeout }
    }

    async fn run(&self, script: &str, env: Vec<(&str, String)>) -> Result<Output, ProvisionError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ProvisionError::StartFailed(format!("spawn '{script}': {e}"))),
            Err(_) => Err(ProvisionError::Timeout(self.timeout)),
        }
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl InstanceProvisioner for CommandProvisioner {
    async fn start(&self, ctx: &StartContext) -> Result<bool, ProvisionError> {
        let mut env = vec![("BM_WORKER_NAME", ctx.worker.to_string())];
        if let Some(builder) = &ctx.builder {
            env.push(("BM_BUILDER", builder.clone()));
        }
        if let Some(build) = &ctx.build {
            env.push(("BM_BUILD_ID", build.to_string()));
        }
        let output = self.run(&self.start_command, env).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(EXIT_DECLINED) => {
                tracing::info!(worker = %ctx.worker, "start script declined");
                Ok(false)
            }
            code => Err(ProvisionError::StartFailed(format!(
                "exit {}: {}",
                code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
                stderr_of(&output)
            ))),
        }
    }

    async fn stop(&self, fast: bool) -> Result<(), ProvisionError> {
        let env = vec![("BM_FAST_STOP", if fast { "1" } else { "0" }.to_string())];
        let output = self.run(&self.stop_command, env).await.map_err(|e| match e {
            ProvisionError::StartFailed(msg) => ProvisionError::StopFailed(msg),
            other => other,
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisionError::StopFailed(stderr_of(&output)))
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
