//! Actuator seam: how key presses leave the controller.
//!
//! Dispatch is fire-and-forget. Implementations must not block; failures are
//! returned so the coordinator can log them, and nothing else.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::core::types::{Direction, Key, ReasonCode, Side, SignalKind};
use crate::error::ActuatorError;

/// What a dispatched key press means
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandKind {
    Pulse {
        side: Side,
        direction: Direction,
        diff_pct: f64,
        index: u32,
        of: u32,
    },
    Confirm {
        side: Side,
        direction: Direction,
        diff_pct: f64,
    },
    Signal {
        signal: SignalKind,
        reason: Option<ReasonCode>,
        retry: bool,
    },
}

/// One key press handed to the actuator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorCommand {
    pub command_id: Uuid,
    pub key: Key,
    #[serde(flatten)]
    pub kind: CommandKind,
    pub issued_at_ms: u64,
}

impl ActuatorCommand {
    pub fn new(key: Key, kind: CommandKind, issued_at_ms: u64) -> Self {
        Self {
            command_id: Uuid::now_v7(),
            key,
            kind,
            issued_at_ms,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self.kind, CommandKind::Signal { .. })
    }
}

pub trait Actuator: Send {
    fn dispatch(&self, command: &ActuatorCommand) -> Result<(), ActuatorError>;
}

/// Logs commands without acting on them (dry run)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn dispatch(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        info!(
            command_id = %command.command_id,
            key = %command.key,
            kind = ?command.kind,
            "[DRY-RUN] Actuator command"
        );
        Ok(())
    }
}

/// Forwards commands to an mpsc consumer without awaiting
#[derive(Debug, Clone)]
pub struct ChannelActuator {
    tx: mpsc::Sender<ActuatorCommand>,
}

impl ChannelActuator {
    pub fn new(tx: mpsc::Sender<ActuatorCommand>) -> Self {
        Self { tx }
    }
}

impl Actuator for ChannelActuator {
    fn dispatch(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        self.tx.try_send(command.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActuatorError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => ActuatorError::ChannelClosed,
        })
    }
}

/// Keeps every dispatched command in memory. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<Vec<ActuatorCommand>>>,
    fail_with: Arc<Mutex<Option<ActuatorError>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dispatches fail after recording
    pub fn fail_with(&self, error: Option<ActuatorError>) {
        if let Ok(mut slot) = self.fail_with.lock() {
            *slot = error;
        }
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.commands().iter().map(|c| c.key).collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Actuator for RecordingActuator {
    fn dispatch(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(command.clone());
        }
        match self.fail_with.lock().ok().and_then(|slot| slot.clone()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> ActuatorCommand {
        ActuatorCommand::new(
            Key::SIGNAL,
            CommandKind::Signal {
                signal: SignalKind::Suspend,
                reason: Some(ReasonCode::SpreadSpike),
                retry: false,
            },
            42,
        )
    }

    #[tokio::test]
    async fn test_channel_actuator_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        let actuator = ChannelActuator::new(tx);
        let cmd = signal();
        actuator.dispatch(&cmd).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, cmd);
        assert!(received.is_signal());
    }

    #[test]
    fn test_channel_actuator_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let actuator = ChannelActuator::new(tx);
        actuator.dispatch(&signal()).unwrap();
        assert_eq!(actuator.dispatch(&signal()), Err(ActuatorError::ChannelFull));
        drop(rx);
        assert_eq!(actuator.dispatch(&signal()), Err(ActuatorError::ChannelClosed));
    }

    #[test]
    fn test_recording_actuator_records_failures_too() {
        let actuator = RecordingActuator::new();
        let shared = actuator.clone();
        actuator.fail_with(Some(ActuatorError::Rejected("busy".into())));
        assert!(actuator.dispatch(&signal()).is_err());
        actuator.fail_with(None);
        assert!(actuator.dispatch(&signal()).is_ok());
        assert_eq!(shared.keys(), vec![Key::F21, Key::F21]);
        assert_eq!(actuator.len(), 2);
    }

    #[test]
    fn test_command_json_shape() {
        let json = serde_json::to_value(signal()).unwrap();
        assert_eq!(json["key"], "F21");
        assert_eq!(json["kind"], "signal");
        assert_eq!(json["signal"], "suspend");
        assert_eq!(json["reason"], "spread_spike");
        assert_eq!(json["issued_at_ms"], 42);
        assert!(json["command_id"].is_string());
    }

    #[test]
    fn test_command_ids_are_unique() {
        assert_ne!(signal().command_id, signal().command_id);
    }
}
