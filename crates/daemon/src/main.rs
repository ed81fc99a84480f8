// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! bmd: build master daemon

use bm_adapters::{DesktopNotifyAdapter, LogNotifyAdapter, NotifyAdapter};
use bm_core::SystemClock;
use bm_daemon::{setup_logging, startup, Config, LifecycleError, NotifyBackend};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), LifecycleError> {
    let config = Config::load()?;
    let _guard = setup_logging(&config)?;

    let result = match config.notify {
        NotifyBackend::Log => serve(config, LogNotifyAdapter).await,
        NotifyBackend::Desktop => serve(config, DesktopNotifyAdapter::new()).await,
    };
    if let Err(e) = &result {
        error!("daemon failed: {}", e);
    }
    result
}

async fn serve<N: NotifyAdapter>(config: Config, notifier: N) -> Result<(), LifecycleError> {
    let daemon = startup(config, notifier, SystemClock)?;
    let mut terminate = signal(SignalKind::terminate())?;
    daemon
        .run(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                _ = terminate.recv() => info!("received SIGTERM"),
            }
        })
        .await
}
