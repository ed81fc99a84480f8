// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker connection contract.
//!
//! The transport (framing, authentication, keepalives on the wire) lives
//! outside this workspace. The master only needs to call remote methods,
//! hear about disconnects, and ask for a close.

use async_trait::async_trait;
use bm_core::ConnectionId;
use serde_json::Value;
use thiserror::Error;

/// Run once when the transport reports the connection gone.
pub type DisconnectCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors from remote calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection lost")]
    ConnectionLost,
    #[error("remote has no method '{0}'")]
    NoSuchMethod(String),
    #[error("remote error: {0}")]
    Remote(String),
}

impl ConnectionError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, ConnectionError::ConnectionLost)
    }
}

/// One live connection from a worker process.
#[async_trait]
pub trait WorkerConnection: Send + Sync + 'static {
    fn id(&self) -> &ConnectionId;

    /// Invoke `method` on the worker.
    async fn remote_call(&self, method: &str, args: Value) -> Result<Value, ConnectionError>;

    /// Register a disconnect callback.
    ///
    /// A callback registered after the connection is already gone runs
    /// immediately.
    fn notify_on_disconnect(&self, callback: DisconnectCallback);

    /// Ask the transport to close. Returns without waiting for the remote
    /// side; the disconnect callbacks fire once the transport gives up.
    fn request_close(&self);
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ConnectionError, DisconnectCallback, WorkerConnection};
    use async_trait::async_trait;
    use bm_core::ConnectionId;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Recorded remote call
    #[derive(Debug, Clone, PartialEq)]
    pub struct RemoteCall {
        pub method: String,
        pub args: Value,
    }

    struct FakeConnectionState {
        calls: Vec<RemoteCall>,
        responses: HashMap<String, Result<Value, ConnectionError>>,
        callbacks: Vec<DisconnectCallback>,
        disconnected: bool,
        close_requests: usize,
        disconnect_on_close: bool,
    }

    /// Scriptable in-memory connection.
    ///
    /// Methods without a scripted response answer `null`. Closing fires the
    /// disconnect callbacks synchronously unless
    /// [`FakeConnection::hold_on_close`] was used.
    #[derive(Clone)]
    pub struct FakeConnection {
        id: ConnectionId,
        inner: Arc<Mutex<FakeConnectionState>>,
    }

    impl Default for FakeConnection {
        fn default() -> Self {
            Self {
                id: ConnectionId::new(),
                inner: Arc::new(Mutex::new(FakeConnectionState {
                    calls: Vec::new(),
                    responses: HashMap::new(),
                    callbacks: Vec::new(),
                    disconnected: false,
                    close_requests: 0,
                    disconnect_on_close: true,
                })),
            }
        }
    }

    impl FakeConnection {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the response to `method`.
        pub fn respond(self, method: &str, response: Result<Value, ConnectionError>) -> Self {
            self.inner.lock().responses.insert(method.to_string(), response);
            self
        }

        /// Keep the connection up after `request_close` until [`Self::drop_connection`].
        pub fn hold_on_close(self) -> Self {
            self.inner.lock().disconnect_on_close = false;
            self
        }

        pub fn calls(&self) -> Vec<RemoteCall> {
            self.inner.lock().calls.clone()
        }

        pub fn calls_to(&self, method: &str) -> Vec<RemoteCall> {
            self.inner.lock().calls.iter().filter(|c| c.method == method).cloned().collect()
        }

        pub fn close_requests(&self) -> usize {
            self.inner.lock().close_requests
        }

        pub fn is_disconnected(&self) -> bool {
            self.inner.lock().disconnected
        }

        /// Simulate the transport losing the connection.
        pub fn drop_connection(&self) {
            let callbacks = {
                let mut state = self.inner.lock();
                if state.disconnected {
                    return;
                }
                state.disconnected = true;
                std::mem::take(&mut state.callbacks)
            };
            for callback in callbacks {
                callback();
            }
        }
    }

    #[async_trait]
    impl WorkerConnection for FakeConnection {
        fn id(&self) -> &ConnectionId {
            &self.id
        }

        async fn remote_call(&self, method: &str, args: Value) -> Result<Value, ConnectionError> {
            let mut state = self.inner.lock();
            state.calls.push(RemoteCall { method: method.to_string(), args });
            if state.disconnected {
                return Err(ConnectionError::ConnectionLost);
            }
            state.responses.get(method).cloned().unwrap_or(Ok(Value::Null))
        }

        fn notify_on_disconnect(&self, callback: DisconnectCallback) {
            let mut state = self.inner.lock();
            if state.disconnected {
                drop(state);
                callback();
                return;
            }
            state.callbacks.push(callback);
        }

        fn request_close(&self) {
            let disconnect = {
                let mut state = self.inner.lock();
                state.close_requests += 1;
                state.disconnect_on_close
            };
            if disconnect {
                self.drop_connection();
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeConnection, RemoteCall};

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
