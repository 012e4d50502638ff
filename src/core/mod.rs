//! Core module - store, guards, alignment engine, coordinator, runtime
//!
//! This module uses **explicit re-exports** instead of glob exports (`pub use module::*`)
//! so the public surface stays visible in one place.
//!
//! ## Usage
//! Prefer importing from `crate::core`:
//! ```ignore
//! use crate::core::{Coordinator, ValueStore, GuardEvaluator};
//! ```

pub mod actuator;
pub mod channels;
pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod guard;
pub mod runtime;
pub mod store;
pub mod timers;
pub mod types;

// Explicit re-exports for the data model
pub use types::{
    AlignAction, AlignmentCheck, ControlSignal, CoordinatorState, Derived, Direction,
    ExternalStatus, GuardVerdict, Key, Phase, ProcessHealth, ReasonCode, Side, SignalKind,
    Snapshot, SourceRecord,
};

// Explicit re-exports for the components
pub use coordinator::Coordinator;
pub use engine::{pulse_count, AlignmentEngine, EngineConfig};
pub use guard::GuardEvaluator;
pub use store::{compute_derived, Listener, SubscriptionId, ValueStore};

// Explicit re-exports for the IO seams
pub use actuator::{
    Actuator, ActuatorCommand, ChannelActuator, CommandKind, LogActuator, RecordingActuator,
};
pub use clock::{current_time_ms, Clock, ManualClock, SystemClock};

// Explicit re-exports for wiring
pub use channels::{parse_event, route, ChannelBundle, ControlCommand, ExternalEvent, IngestEvent, Routed};
pub use events::{format_pct, log_event, ControlEvent, ControlEventType};
pub use runtime::{control_task, ControlRuntime};
