// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the engine crate.

use crate::master::{BotMaster, MasterDeps};
use crate::worker::WorkerStatus;
use bm_adapters::{FakeConnection, FakeNotifyAdapter, FakeProvisioner, InstanceProvisioner};
use bm_core::{
    Event, FakeClock, LatentConfig, MasterConfig, ProvisionerConfig, WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Convenience alias for the fully-typed test master.
pub(crate) type TestMaster = BotMaster<FakeNotifyAdapter, FakeClock>;

/// Test context holding the master, its fakes, and the event channel.
pub(crate) struct TestContext {
    pub master: TestMaster,
    pub clock: FakeClock,
    pub notifier: FakeNotifyAdapter,
    /// Shared by every latent worker in the context.
    pub provisioner: FakeProvisioner,
    pub event_rx: mpsc::Receiver<Event>,
}

/// Create a master loaded with `config`.
pub(crate) fn setup(config: MasterConfig) -> TestContext {
    let notifier = FakeNotifyAdapter::new();
    let provisioner = FakeProvisioner::new();
    let clock = FakeClock::new();
    let (event_tx, event_rx) = mpsc::channel(100);

    let shared = provisioner.clone();
    let deps = MasterDeps::new(notifier.clone()).with_provisioners(Arc::new(move |_, _| {
        Arc::new(shared.clone()) as Arc<dyn InstanceProvisioner>
    }));
    let master = BotMaster::new(deps, clock.clone(), event_tx);
    master.reconfigure(config);

    TestContext { master, clock, notifier, provisioner, event_rx }
}

/// Master with the given workers and no global locks.
pub(crate) fn setup_workers(workers: Vec<WorkerConfig>) -> TestContext {
    setup(MasterConfig { locks: Vec::new(), workers })
}

/// A latent worker named `name` with the given idle timeout.
pub(crate) fn latent_worker(name: &str, build_wait: Option<Duration>) -> WorkerConfig {
    WorkerConfig::builder()
        .name(name)
        .latent(
            LatentConfig::new(ProvisionerConfig::command("up", "down"))
                .build_wait_timeout(build_wait)
                .substantiation_timeout(Duration::from_secs(60)),
        )
        .build()
}

impl TestContext {
    /// Let spawned effects run, then feed every event they produced back in.
    ///
    /// Repeats until a round produces no events, so chains (stop after a
    /// failed start) settle completely.
    pub(crate) async fn process_background_events(&mut self) {
        loop {
            // Yield to let tokio::spawn tasks complete (the fakes are synchronous)
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            let mut events = Vec::new();
            while let Ok(event) = self.event_rx.try_recv() {
                events.push(event);
            }
            if events.is_empty() {
                return;
            }
            for event in events {
                self.master.handle_event(event);
            }
        }
    }

    /// Move time forward, fire due timers, and settle.
    pub(crate) async fn advance(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.master.tick();
        self.process_background_events().await;
    }

    /// Attach a new fake connection for `worker` and settle.
    pub(crate) async fn connect(&mut self, worker: &str) -> FakeConnection {
        let connection = FakeConnection::new();
        self.master.attach(worker, Arc::new(connection.clone())).await.unwrap();
        self.process_background_events().await;
        connection
    }

    pub(crate) fn status(&self, worker: &str) -> WorkerStatus {
        self.master.worker_status(worker).unwrap()
    }
}
