// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator notification sinks.
//!
//! Notifications are advisory. Callers spawn sends and log failures; a
//! failed send never fails a build.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for sending notifications
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    /// Deliver `subject`/`body` to every address in `recipients`.
    async fn send(&self, subject: &str, body: &str, recipients: &[String])
        -> Result<(), NotifyError>;
}

/// Writes notifications to the daemon log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifyAdapter;

#[async_trait]
impl NotifyAdapter for LogNotifyAdapter {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        tracing::warn!(%subject, recipients = %recipients.join(", "), "operator notification\n{body}");
        Ok(())
    }
}

/// Desktop notification adapter using notify-rust.
///
/// Useful when the master runs on an operator's own machine. Recipients
/// have no meaning on a desktop and are only logged.
///
/// On macOS, `notify-rust` uses `mac-notification-sys`, whose first
/// notification runs an AppleScript bundle lookup that blocks forever in a
/// daemon without Automation permissions. The bundle identifier is set up
/// front to skip it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifyAdapter;

impl DesktopNotifyAdapter {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }
}

#[async_trait]
impl NotifyAdapter for DesktopNotifyAdapter {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        let subject = subject.to_string();
        let body = body.to_string();
        tracing::info!(%subject, recipients = %recipients.join(", "), "sending desktop notification");
        // Notification::show() is synchronous on macOS
        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new().summary(&subject).body(&body).show().map(|_| ())
        })
        .await
        .map_err(|e| NotifyError::SendFailed(e.to_string()))?
        .map_err(|e| NotifyError::SendFailed(e.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{NotifyAdapter, NotifyError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification
    #[derive(Debug, Clone)]
    pub struct NotifyCall {
        pub subject: String,
        pub body: String,
        pub recipients: Vec<String>,
    }

    struct FakeNotifyState {
        calls: Vec<NotifyCall>,
        fail: bool,
    }

    /// Fake notification adapter for testing
    #[derive(Clone)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<FakeNotifyState>>,
    }

    impl Default for FakeNotifyAdapter {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeNotifyState { calls: Vec::new(), fail: false })) }
        }
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Record sends but report them as failed.
        pub fn failing() -> Self {
            let adapter = Self::default();
            adapter.inner.lock().fail = true;
            adapter
        }

        /// Get all recorded notifications
        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn send(
            &self,
            subject: &str,
            body: &str,
            recipients: &[String],
        ) -> Result<(), NotifyError> {
            let mut state = self.inner.lock();
            state.calls.push(NotifyCall {
                subject: subject.to_string(),
                body: body.to_string(),
                recipients: recipients.to_vec(),
            });
            if state.fail {
                return Err(NotifyError::SendFailed("fake failure".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
