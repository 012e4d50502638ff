//! Control runtime and its async task loop
//!
//! `ControlRuntime` owns the `ValueStore` and the `Coordinator` outright, so
//! every mutation happens on one logical thread without locks. The control
//! task feeds it ingestion events, commands and timer deadlines.

use std::future;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::actuator::Actuator;
use crate::core::channels::{ControlCommand, IngestEvent};
use crate::core::clock::Clock;
use crate::core::coordinator::Coordinator;
use crate::core::store::ValueStore;
use crate::core::types::{ControlSignal, CoordinatorState, Derived, Snapshot};
use crate::error::AppError;

pub struct ControlRuntime<A: Actuator> {
    store: ValueStore,
    coordinator: Coordinator<A>,
    derived_rx: watch::Receiver<Derived>,
}

impl<A: Actuator> ControlRuntime<A> {
    pub fn new(config: &AppConfig, actuator: A, clock: Box<dyn Clock>) -> Result<Self, AppError> {
        let coordinator = Coordinator::new(config, actuator, clock)?;
        let mut store = ValueStore::new(config.targets.clone());

        let (derived_tx, derived_rx) = watch::channel(Derived::default());
        store.subscribe(Box::new(move |snapshot: &Snapshot| {
            derived_tx.send_if_modified(|current| {
                if *current != snapshot.derived {
                    *current = snapshot.derived;
                    true
                } else {
                    false
                }
            });
        }));

        Ok(Self {
            store,
            coordinator,
            derived_rx,
        })
    }

    /// Apply a store change, then let the coordinator react to it.
    pub fn on_ingest(&mut self, event: IngestEvent) -> Result<(), AppError> {
        match event {
            IngestEvent::Record(record) => self.store.upsert(record)?,
            IngestEvent::Removed(source_id) => {
                if !self.store.remove(&source_id) {
                    debug!(source_id = %source_id, "Removal of unknown source ignored");
                    return Ok(());
                }
            }
            IngestEvent::Swapped(source_ids) => {
                if !self.store.set_swapped(&source_ids) {
                    return Ok(());
                }
            }
        }
        self.coordinator.on_snapshot(self.store.snapshot());
        Ok(())
    }

    pub fn on_command(&mut self, command: ControlCommand) -> Result<(), AppError> {
        let snapshot = self.store.snapshot();
        match command {
            ControlCommand::Enable => {
                self.coordinator.enable(snapshot);
            }
            ControlCommand::Disable => self.coordinator.disable(),
            ControlCommand::Toggle => {
                self.coordinator.toggle(snapshot);
            }
            ControlCommand::SetMode(mode) => self.coordinator.set_mode(mode),
            ControlCommand::SetConfig(update) => self.coordinator.set_config(&update)?,
            ControlCommand::ProcessHealth(health) => {
                self.coordinator.set_process_health(health, snapshot)
            }
            ControlCommand::Connected(connected) => {
                self.coordinator.set_connected(connected, snapshot)
            }
            ControlCommand::ExpectedIndex(index) => {
                self.coordinator.set_expected_index(index, snapshot)
            }
            ControlCommand::ObservedIndex(index) => {
                self.coordinator.set_observed_index(index, snapshot)
            }
            ControlCommand::GuardSettings(update) => {
                self.coordinator.set_guard_settings(&update, snapshot)
            }
        }
        Ok(())
    }

    /// Run due timers. Returns how many came due.
    pub fn on_timers(&mut self) -> usize {
        self.coordinator.fire_due(self.store.snapshot())
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.coordinator.next_deadline()
    }

    pub fn now_ms(&self) -> u64 {
        self.coordinator.now_ms()
    }

    pub fn state(&self) -> &CoordinatorState {
        self.coordinator.state()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.store.snapshot()
    }

    pub fn coordinator(&self) -> &Coordinator<A> {
        &self.coordinator
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.coordinator.subscribe()
    }

    pub fn signals(&self) -> broadcast::Receiver<ControlSignal> {
        self.coordinator.signals()
    }

    /// Feed of derived reference values, updated on every store change
    pub fn derived(&self) -> watch::Receiver<Derived> {
        self.derived_rx.clone()
    }
}

/// Control task: the only place the runtime is mutated.
///
/// Shutdown takes priority, then ingestion, then commands, then timers.
/// Returns the runtime so callers can inspect the final state.
pub async fn control_task<A: Actuator>(
    mut runtime: ControlRuntime<A>,
    mut ingest_rx: mpsc::Receiver<IngestEvent>,
    mut command_rx: mpsc::Receiver<ControlCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ControlRuntime<A> {
    info!(mode = %runtime.state().mode, "Control task started");

    loop {
        let wait_ms = runtime
            .next_deadline_ms()
            .map(|deadline| deadline.saturating_sub(runtime.now_ms()));

        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Control task shutting down");
                break;
            }
            Some(event) = ingest_rx.recv() => {
                if let Err(e) = runtime.on_ingest(event) {
                    warn!(error = %e, "Ingest event rejected");
                }
            }
            Some(command) = command_rx.recv() => {
                debug!(command = ?command, "Control command received");
                if let Err(e) = runtime.on_command(command) {
                    warn!(error = %e, "Control command rejected");
                }
            }
            _ = sleep_until_deadline(wait_ms) => {
                runtime.on_timers();
            }
        }
    }

    info!(epoch = runtime.state().epoch, "Control task stopped");
    runtime
}

async fn sleep_until_deadline(wait_ms: Option<u64>) {
    match wait_ms {
        Some(ms) => sleep(Duration::from_millis(ms)).await,
        None => future::pending().await,
    }
}
