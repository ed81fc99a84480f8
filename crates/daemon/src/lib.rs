// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build master daemon library
//!
//! Hosts a [`bm_engine::BotMaster`]: loads the worker and lock tables, drives
//! its timers and background events, and tears it down on signal.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;

pub use env::NotifyBackend;
pub use lifecycle::{load_master_config, setup_logging, startup, Config, Daemon, LifecycleError};
