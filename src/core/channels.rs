//! Wire events and the channel bundle
//!
//! External producers speak `ExternalEvent` (one JSON object per message,
//! tagged by `type`). `route()` splits them into store ingestion and control
//! commands, which travel to the control task on separate bounded channels.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::config::constants;
use crate::config::{ConfigUpdate, GuardSettingsUpdate, Mode};
use crate::core::actuator::ActuatorCommand;
use crate::core::types::{ProcessHealth, SourceRecord};
use crate::error::AppError;

/// Default capacity of the actuator output channel
pub const DEFAULT_ACTUATOR_CHANNEL_CAPACITY: usize = 256;

/// Inbound wire event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalEvent {
    Record {
        source_id: String,
        /// Anything that is not a number (or numeric string) becomes a sentinel
        #[serde(default)]
        sides: Vec<Value>,
        #[serde(default)]
        frozen: bool,
        #[serde(default)]
        observed_at_ms: Option<u64>,
    },
    Removed {
        source_id: String,
    },
    /// Full replacement of the side-swapped source set
    SwappedSources {
        #[serde(default)]
        source_ids: Vec<String>,
    },
    Enable,
    Disable,
    Toggle,
    SetMode {
        mode: Mode,
    },
    SetConfig {
        config: ConfigUpdate,
    },
    ProcessHealth(ProcessHealth),
    Connected {
        connected: bool,
    },
    ExpectedIndex {
        index: Option<i64>,
    },
    ObservedIndex {
        index: Option<i64>,
    },
    GuardSettings(GuardSettingsUpdate),
}

/// Store-bound half of the traffic
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Record(SourceRecord),
    Removed(String),
    Swapped(Vec<String>),
}

/// Coordinator-bound half of the traffic
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Enable,
    Disable,
    Toggle,
    SetMode(Mode),
    SetConfig(ConfigUpdate),
    ProcessHealth(ProcessHealth),
    Connected(bool),
    ExpectedIndex(Option<i64>),
    ObservedIndex(Option<i64>),
    GuardSettings(GuardSettingsUpdate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Ingest(IngestEvent),
    Command(ControlCommand),
}

pub fn parse_event(line: &str) -> Result<ExternalEvent, AppError> {
    Ok(serde_json::from_str(line)?)
}

/// Split an external event into ingestion or command traffic.
///
/// Records without a timestamp are stamped with `now_ms`.
pub fn route(event: ExternalEvent, now_ms: u64) -> Result<Routed, AppError> {
    let routed = match event {
        ExternalEvent::Record {
            source_id,
            sides,
            frozen,
            observed_at_ms,
        } => {
            let sides: Vec<Option<f64>> = sides.iter().map(side_value).collect();
            let record =
                SourceRecord::from_slice(source_id, &sides, frozen, observed_at_ms.unwrap_or(now_ms))?;
            Routed::Ingest(IngestEvent::Record(record))
        }
        ExternalEvent::Removed { source_id } => Routed::Ingest(IngestEvent::Removed(source_id)),
        ExternalEvent::SwappedSources { source_ids } => {
            Routed::Ingest(IngestEvent::Swapped(source_ids))
        }
        ExternalEvent::Enable => Routed::Command(ControlCommand::Enable),
        ExternalEvent::Disable => Routed::Command(ControlCommand::Disable),
        ExternalEvent::Toggle => Routed::Command(ControlCommand::Toggle),
        ExternalEvent::SetMode { mode } => Routed::Command(ControlCommand::SetMode(mode)),
        ExternalEvent::SetConfig { config } => Routed::Command(ControlCommand::SetConfig(config)),
        ExternalEvent::ProcessHealth(health) => {
            Routed::Command(ControlCommand::ProcessHealth(health))
        }
        ExternalEvent::Connected { connected } => {
            Routed::Command(ControlCommand::Connected(connected))
        }
        ExternalEvent::ExpectedIndex { index } => {
            Routed::Command(ControlCommand::ExpectedIndex(index))
        }
        ExternalEvent::ObservedIndex { index } => {
            Routed::Command(ControlCommand::ObservedIndex(index))
        }
        ExternalEvent::GuardSettings(update) => Routed::Command(ControlCommand::GuardSettings(update)),
    };
    Ok(routed)
}

fn side_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Bundle of all inter-task communication channels
#[derive(Debug)]
pub struct ChannelBundle {
    /// Readers -> control task: record upserts and removals
    pub ingest_tx: mpsc::Sender<IngestEvent>,
    pub ingest_rx: mpsc::Receiver<IngestEvent>,

    /// Readers -> control task: user and status commands
    pub command_tx: mpsc::Sender<ControlCommand>,
    pub command_rx: mpsc::Receiver<ControlCommand>,

    /// Control task -> output writer: key presses
    pub actuator_tx: mpsc::Sender<ActuatorCommand>,
    pub actuator_rx: mpsc::Receiver<ActuatorCommand>,

    /// Shutdown broadcast: main -> all tasks
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ChannelBundle {
    pub fn new(ingest_capacity: usize, command_capacity: usize, actuator_capacity: usize) -> Self {
        let (ingest_tx, ingest_rx) = mpsc::channel(ingest_capacity);
        let (command_tx, command_rx) = mpsc::channel(command_capacity);
        let (actuator_tx, actuator_rx) = mpsc::channel(actuator_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            ingest_tx,
            ingest_rx,
            command_tx,
            command_rx,
            actuator_tx,
            actuator_rx,
            shutdown_tx,
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new(
            constants::ingest_channel_capacity(),
            constants::command_channel_capacity(),
            DEFAULT_ACTUATOR_CHANNEL_CAPACITY,
        )
    }
}
