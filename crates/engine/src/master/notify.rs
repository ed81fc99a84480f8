// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing message text.

use crate::error::SubstantiationError;
use crate::worker::WorkerProxy;
use chrono::{DateTime, Utc};
use std::fmt::Write;

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn or_unknown(value: Option<&String>) -> &str {
    value.map(String::as_str).unwrap_or("unknown")
}

/// Subject and body telling operators a worker has not come back.
pub(crate) fn missing_worker(proxy: &WorkerProxy, now: DateTime<Utc>) -> (String, String) {
    let name = proxy.name();
    let subject = format!("worker {name} missing");
    let mut body = format!("The worker named {name} went away.\n\n");

    match (proxy.last_connected, proxy.last_disconnected) {
        (Some(connected), Some(disconnected)) => {
            let _ = writeln!(body, "It connected at {}", timestamp(&connected));
            let _ = writeln!(body, "and disconnected at {}.", timestamp(&disconnected));
        }
        (None, Some(disconnected)) => {
            let _ = writeln!(body, "It disconnected at {}.", timestamp(&disconnected));
        }
        _ => {
            let _ = writeln!(body, "It has not connected since the master started.");
        }
    }
    let _ = writeln!(
        body,
        "It has been missing for at least {} seconds (as of {}).\n",
        proxy.config.missing_timeout.as_secs(),
        timestamp(&now)
    );

    let info = &proxy.info;
    let _ = writeln!(body, "The admin on record (as reported by the worker) is: {}", or_unknown(info.admin.as_ref()));
    let _ = writeln!(body, "Host: {}", or_unknown(info.host.as_ref()));
    if let Some(uri) = &info.access_uri {
        let _ = writeln!(body, "Access: {uri}");
    }
    let _ = writeln!(body, "\nIf the worker is not coming back, remove it from the configuration.");
    (subject, body)
}

/// Subject and body for a latent worker that failed to come up.
pub(crate) fn never_substantiated(
    proxy: &WorkerProxy,
    error: &SubstantiationError,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (String, String) {
    let name = proxy.name();
    let subject = format!("latent worker {name} never substantiated");
    let mut body = format!("The latent worker named {name} could not be brought up.\n\n");
    if let Some(since) = since {
        let _ = writeln!(body, "Substantiation started at {}", timestamp(&since));
    }
    let _ = writeln!(body, "and was given up at {}.", timestamp(&now));
    let _ = writeln!(body, "\nReason: {error}");
    let _ = writeln!(body, "\nThe instance has been told to stop. The next build for this worker will try again.");
    (subject, body)
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
