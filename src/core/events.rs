//! Control Event System
//!
//! Structured event types for logging coordinator transitions. All events use
//! a consistent schema so a session timeline can be reconstructed from logs.
//!
//! # Example
//!
//! ```ignore
//! use crate::core::events::{ControlEvent, log_event};
//!
//! log_event(&ControlEvent::suspended(ReasonCode::SpreadSpike, Mode::Script, false));
//! ```

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::core::types::{Direction, Key, Phase, ReasonCode, Side};

/// Control event types for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEventType {
    Enabled,
    Blocked,
    Disabled,
    Suspended,
    Resumed,
    AlignStarted,
    Aligned,
    AlignFailed,
    PulseBurst,
    DispatchFailed,
    ModeChanged,
    ConfigUpdated,
}

impl fmt::Display for ControlEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlEventType::Enabled => "ENABLED",
            ControlEventType::Blocked => "BLOCKED",
            ControlEventType::Disabled => "DISABLED",
            ControlEventType::Suspended => "SUSPENDED",
            ControlEventType::Resumed => "RESUMED",
            ControlEventType::AlignStarted => "ALIGN_STARTED",
            ControlEventType::Aligned => "ALIGNED",
            ControlEventType::AlignFailed => "ALIGN_FAILED",
            ControlEventType::PulseBurst => "PULSE_BURST",
            ControlEventType::DispatchFailed => "DISPATCH_FAILED",
            ControlEventType::ModeChanged => "MODE_CHANGED",
            ControlEventType::ConfigUpdated => "CONFIG_UPDATED",
        };
        f.write_str(s)
    }
}

/// Control event with optional context fields
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub event_type: ControlEventType,
    pub mode: Option<Mode>,
    pub phase: Option<Phase>,
    pub reason: Option<ReasonCode>,
    pub diff_pct: Option<f64>,
    pub side: Option<Side>,
    pub direction: Option<Direction>,
    pub key: Option<Key>,
    pub pulses: Option<u32>,
    pub attempts: Option<u32>,
    pub epoch: Option<u64>,
    pub detail: Option<String>,
}

impl ControlEvent {
    pub fn new(event_type: ControlEventType) -> Self {
        Self {
            event_type,
            mode: None,
            phase: None,
            reason: None,
            diff_pct: None,
            side: None,
            direction: None,
            key: None,
            pulses: None,
            attempts: None,
            epoch: None,
            detail: None,
        }
    }

    pub fn enabled(mode: Mode, phase: Phase, epoch: u64) -> Self {
        Self {
            mode: Some(mode),
            phase: Some(phase),
            epoch: Some(epoch),
            ..Self::new(ControlEventType::Enabled)
        }
    }

    pub fn blocked(mode: Mode, reason: ReasonCode) -> Self {
        Self {
            mode: Some(mode),
            reason: Some(reason),
            ..Self::new(ControlEventType::Blocked)
        }
    }

    pub fn disabled(epoch: u64) -> Self {
        Self {
            reason: Some(ReasonCode::Manual),
            epoch: Some(epoch),
            ..Self::new(ControlEventType::Disabled)
        }
    }

    pub fn suspended(reason: ReasonCode, mode: Mode, hard: bool) -> Self {
        Self {
            mode: Some(mode),
            reason: Some(reason),
            detail: Some(if hard { "hard" } else { "soft" }.to_string()),
            ..Self::new(ControlEventType::Suspended)
        }
    }

    pub fn resumed(previous: ReasonCode, mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            reason: Some(previous),
            ..Self::new(ControlEventType::Resumed)
        }
    }

    pub fn align_started(epoch: u64) -> Self {
        Self {
            phase: Some(Phase::Aligning),
            epoch: Some(epoch),
            ..Self::new(ControlEventType::AlignStarted)
        }
    }

    pub fn aligned(attempts: u32, diff_pct: Option<f64>) -> Self {
        Self {
            phase: Some(Phase::Trading),
            attempts: Some(attempts),
            diff_pct,
            ..Self::new(ControlEventType::Aligned)
        }
    }

    pub fn align_failed(attempts: u32, diff_pct: Option<f64>, cause: &str) -> Self {
        Self {
            phase: Some(Phase::Idle),
            reason: Some(ReasonCode::AlignFailed),
            attempts: Some(attempts),
            diff_pct,
            detail: Some(cause.to_string()),
            ..Self::new(ControlEventType::AlignFailed)
        }
    }

    pub fn pulse_burst(key: Key, side: Side, direction: Direction, pulses: u32, diff_pct: f64) -> Self {
        Self {
            key: Some(key),
            side: Some(side),
            direction: Some(direction),
            pulses: Some(pulses),
            diff_pct: Some(diff_pct),
            ..Self::new(ControlEventType::PulseBurst)
        }
    }

    pub fn dispatch_failed(key: Key, error: &str) -> Self {
        Self {
            key: Some(key),
            detail: Some(error.to_string()),
            ..Self::new(ControlEventType::DispatchFailed)
        }
    }

    pub fn mode_changed(mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::new(ControlEventType::ModeChanged)
        }
    }

    pub fn config_updated(detail: String) -> Self {
        Self {
            detail: Some(detail),
            ..Self::new(ControlEventType::ConfigUpdated)
        }
    }
}

/// Format a percentage with 2 decimal places
#[inline]
pub fn format_pct(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Log a control event using structured tracing fields
///
/// Pulse bursts are high-frequency and go to DEBUG; failures go to WARN.
pub fn log_event(event: &ControlEvent) {
    let event_type = event.event_type.to_string();
    let diff = event.diff_pct.map(format_pct);
    let reason_label = event.reason.map(|r| r.label());

    match event.event_type {
        ControlEventType::PulseBurst => {
            debug!(
                event_type = %event_type,
                key = ?event.key,
                side = ?event.side,
                direction = ?event.direction,
                pulses = ?event.pulses,
                diff = ?diff,
                ""
            );
        }
        ControlEventType::DispatchFailed | ControlEventType::AlignFailed | ControlEventType::Blocked => {
            warn!(
                event_type = %event_type,
                mode = ?event.mode,
                reason = ?event.reason,
                reason_label = ?reason_label,
                attempts = ?event.attempts,
                diff = ?diff,
                key = ?event.key,
                detail = ?event.detail,
                ""
            );
        }
        _ => {
            info!(
                event_type = %event_type,
                mode = ?event.mode,
                phase = ?event.phase,
                reason = ?event.reason,
                reason_label = ?reason_label,
                attempts = ?event.attempts,
                diff = ?diff,
                epoch = ?event.epoch,
                detail = ?event.detail,
                ""
            );
        }
    }
}
