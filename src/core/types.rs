//! Core data types for the alignment controller.
//!
//! Source records and derived reference values, guard verdicts, alignment
//! actions, and the coordinator's observable state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ControlConfig, Mode};
use crate::error::AppError;

// =============================================================================
// Sides, directions and keys
// =============================================================================

/// One of the two sides of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    First,
    Second,
}

impl Side {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.index() + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Raise,
    Lower,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Raise => write!(f, "raise"),
            Direction::Lower => write!(f, "lower"),
        }
    }
}

/// Actuator key codes
///
/// The downstream system maps each side's raise/lower onto a shared pair of
/// keys, mirrored between sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    F21,
    F22,
    F23,
    F24,
}

impl Key {
    /// Commits the preceding pulses
    pub const CONFIRM: Key = Key::F22;
    /// Suspend / resume signal
    pub const SIGNAL: Key = Key::F21;

    pub fn for_pulse(side: Side, direction: Direction) -> Key {
        match (side, direction) {
            (Side::First, Direction::Raise) => Key::F24,
            (Side::First, Direction::Lower) => Key::F23,
            (Side::Second, Direction::Raise) => Key::F23,
            (Side::Second, Direction::Lower) => Key::F24,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Source records and snapshots
// =============================================================================

/// Latest observation from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    /// `None` is the sentinel for a missing or non-numeric side
    pub sides: [Option<f64>; 2],
    /// Excluded from the reference but still tracked
    pub frozen: bool,
    pub observed_at_ms: u64,
}

impl SourceRecord {
    /// Build a record, normalizing sides that are not positive finite numbers to `None`.
    pub fn new(
        source_id: impl Into<String>,
        sides: [Option<f64>; 2],
        frozen: bool,
        observed_at_ms: u64,
    ) -> Result<Self, AppError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(AppError::InvalidRecord("empty source id".to_string()));
        }
        Ok(Self {
            source_id,
            sides: [normalize_side(sides[0]), normalize_side(sides[1])],
            frozen,
            observed_at_ms,
        })
    }

    /// Build from a loosely shaped payload. Anything but exactly two sides is
    /// stored with both sides as sentinels.
    pub fn from_slice(
        source_id: impl Into<String>,
        sides: &[Option<f64>],
        frozen: bool,
        observed_at_ms: u64,
    ) -> Result<Self, AppError> {
        let pair = match sides {
            [a, b] => [*a, *b],
            _ => [None, None],
        };
        Self::new(source_id, pair, frozen, observed_at_ms)
    }

    /// Both sides, when both are numeric
    #[inline]
    pub fn values(&self) -> Option<[f64; 2]> {
        match self.sides {
            [Some(a), Some(b)] => Some([a, b]),
            _ => None,
        }
    }
}

fn normalize_side(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Reference values computed from qualifying records
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Derived {
    /// Per-side mid of min and max across qualifying sources
    pub reference: Option<[f64; 2]>,
    /// Arbitrage percentage from the best value on each side
    pub spread_pct: Option<f64>,
}

impl Derived {
    #[inline]
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }
}

/// Read-only view of the store
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub records: BTreeMap<String, SourceRecord>,
    pub derived: Derived,
}

impl Snapshot {
    pub fn record(&self, source_id: &str) -> Option<&SourceRecord> {
        self.records.get(source_id)
    }

    /// Numeric values of `source_id`, if present on both sides
    pub fn values_of(&self, source_id: &str) -> Option<[f64; 2]> {
        self.record(source_id).and_then(SourceRecord::values)
    }

    pub fn is_frozen(&self, source_id: &str) -> bool {
        self.record(source_id).map(|r| r.frozen).unwrap_or(false)
    }
}

// =============================================================================
// External status
// =============================================================================

/// Health of the locally supervised script process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessHealth {
    /// `None` until the supervisor has reported at least once
    pub running: Option<bool>,
    pub starting: bool,
    pub installing: bool,
    pub error: Option<String>,
}

pub const EXPECTED_INDEX_RANGE: (i64, i64) = (1, 5);
pub const OBSERVED_INDEX_RANGE: (i64, i64) = (0, 5);

/// Externally pushed status consulted by the guards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalStatus {
    pub process: ProcessHealth,
    /// Remote service connectivity
    pub connected: bool,
    pub expected_index: Option<u8>,
    pub observed_index: Option<u8>,
}

impl ExternalStatus {
    /// Merge a health push. Fields the push does not know stay as they were.
    pub fn merge_process(&mut self, health: ProcessHealth) {
        if health.running.is_some() {
            self.process.running = health.running;
        }
        self.process.starting = health.starting;
        self.process.installing = health.installing;
        self.process.error = health.error;
    }

    /// Out-of-range values clear the index to unknown.
    pub fn set_expected_index(&mut self, index: Option<i64>) {
        self.expected_index = index_in_range(index, EXPECTED_INDEX_RANGE);
    }

    /// Out-of-range values clear the index to unknown.
    pub fn set_observed_index(&mut self, index: Option<i64>) {
        self.observed_index = index_in_range(index, OBSERVED_INDEX_RANGE);
    }

    /// Observed index with 0 meaning "first"
    pub fn effective_observed_index(&self) -> Option<u8> {
        self.observed_index.map(|i| if i == 0 { 1 } else { i })
    }

    /// True only when both indices are known and disagree
    pub fn index_mismatch(&self) -> bool {
        match (self.expected_index, self.effective_observed_index()) {
            (Some(expected), Some(observed)) => expected != observed,
            _ => false,
        }
    }
}

fn index_in_range(index: Option<i64>, range: (i64, i64)) -> Option<u8> {
    index
        .filter(|i| *i >= range.0 && *i <= range.1)
        .and_then(|i| u8::try_from(i).ok())
}

// =============================================================================
// Reasons and verdicts
// =============================================================================

/// Why the coordinator is not (or not yet) trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Manual,
    ProcessUnknown,
    ProcessOff,
    ProcessStarting,
    ProcessInstalling,
    NotConnected,
    IndexMismatch,
    PrimarySuspended,
    NoReference,
    SpreadSpike,
    Aligning,
    AlignFailed,
}

impl ReasonCode {
    /// Short display label; empty for a manual stop
    pub fn label(self) -> &'static str {
        match self {
            ReasonCode::Manual => "",
            ReasonCode::ProcessUnknown => "WAIT",
            ReasonCode::ProcessOff => "SCRIPT",
            ReasonCode::ProcessStarting => "START",
            ReasonCode::ProcessInstalling => "DEPS",
            ReasonCode::NotConnected => "DS",
            ReasonCode::IndexMismatch => "MAP",
            ReasonCode::PrimarySuspended => "SUSP",
            ReasonCode::NoReference => "MID",
            ReasonCode::SpreadSpike => "ARB",
            ReasonCode::Aligning => "ALIGN",
            ReasonCode::AlignFailed => "FAIL",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::Manual => "manual",
            ReasonCode::ProcessUnknown => "process_unknown",
            ReasonCode::ProcessOff => "process_off",
            ReasonCode::ProcessStarting => "process_starting",
            ReasonCode::ProcessInstalling => "process_installing",
            ReasonCode::NotConnected => "not_connected",
            ReasonCode::IndexMismatch => "index_mismatch",
            ReasonCode::PrimarySuspended => "primary_suspended",
            ReasonCode::NoReference => "no_reference",
            ReasonCode::SpreadSpike => "spread_spike",
            ReasonCode::Aligning => "aligning",
            ReasonCode::AlignFailed => "align_failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one guard evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GuardVerdict {
    Allowed,
    /// Needs an external status change to clear
    HardBlock { reason: ReasonCode },
    /// Clears on its own once the condition reverses
    SoftSuspend {
        reason: ReasonCode,
        /// The operator paused the target themselves
        user_initiated: bool,
    },
}

impl GuardVerdict {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allowed)
    }

    #[inline]
    pub fn is_hard_block(&self) -> bool {
        matches!(self, GuardVerdict::HardBlock { .. })
    }

    #[inline]
    pub fn is_soft_suspend(&self) -> bool {
        matches!(self, GuardVerdict::SoftSuspend { .. })
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            GuardVerdict::Allowed => None,
            GuardVerdict::HardBlock { reason } | GuardVerdict::SoftSuspend { reason, .. } => {
                Some(*reason)
            }
        }
    }
}

// =============================================================================
// Alignment actions
// =============================================================================

/// Decision of the alignment engine for one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlignAction {
    None {
        aligned: bool,
        /// Missing when inputs were missing
        diff_pct: Option<f64>,
    },
    Pulse {
        key: Key,
        side: Side,
        direction: Direction,
        pulses: u32,
        diff_pct: f64,
    },
}

impl AlignAction {
    pub const NO_INPUT: AlignAction = AlignAction::None {
        aligned: false,
        diff_pct: None,
    };

    pub fn is_pulse(&self) -> bool {
        matches!(self, AlignAction::Pulse { .. })
    }
}

/// Result of a tolerance check on the sensitive side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentCheck {
    pub aligned: bool,
    pub diff_pct: Option<f64>,
    pub side: Side,
}

// =============================================================================
// Coordinator state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Aligning,
    Trading,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Aligning => write!(f, "aligning"),
            Phase::Trading => write!(f, "trading"),
        }
    }
}

/// Observable coordinator state, published on every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorState {
    pub active: bool,
    pub phase: Phase,
    pub mode: Mode,
    pub reason: Option<ReasonCode>,
    /// The user asked for trading and has not withdrawn it
    pub user_wanted: bool,
    /// The current suspension came from the operator pausing the target
    pub user_suspended: bool,
    /// Short human-readable status line
    pub status: String,
    pub epoch: u64,
    pub config: ControlConfig,
}

impl CoordinatorState {
    pub fn initial(mode: Mode, config: ControlConfig) -> Self {
        Self {
            active: false,
            phase: Phase::Idle,
            mode,
            reason: Some(ReasonCode::Manual),
            user_wanted: false,
            user_suspended: false,
            status: String::new(),
            epoch: 0,
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Suspend,
    Resume,
}

/// One-shot notification emitted on every suspend/resume transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSignal {
    pub kind: SignalKind,
    pub reason: Option<ReasonCode>,
    pub at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_resolution_mirrors_sides() {
        assert_eq!(Key::for_pulse(Side::First, Direction::Raise), Key::F24);
        assert_eq!(Key::for_pulse(Side::First, Direction::Lower), Key::F23);
        assert_eq!(Key::for_pulse(Side::Second, Direction::Raise), Key::F23);
        assert_eq!(Key::for_pulse(Side::Second, Direction::Lower), Key::F24);
        assert_eq!(Key::CONFIRM, Key::F22);
        assert_eq!(Key::SIGNAL, Key::F21);
    }

    #[test]
    fn test_record_normalizes_bad_sides() {
        let rec = SourceRecord::new("pinnacle", [Some(f64::NAN), Some(-1.0)], false, 0).unwrap();
        assert_eq!(rec.sides, [None, None]);
        assert!(rec.values().is_none());

        let rec = SourceRecord::new("pinnacle", [Some(1.9), Some(f64::INFINITY)], false, 0).unwrap();
        assert_eq!(rec.sides, [Some(1.9), None]);
    }

    #[test]
    fn test_record_rejects_empty_id() {
        let err = SourceRecord::new("  ", [Some(1.9), Some(2.0)], false, 0).unwrap_err();
        assert!(err.to_string().contains("empty source id"));
    }

    #[test]
    fn test_record_from_wrong_length_slice() {
        let rec = SourceRecord::from_slice("bet365", &[Some(1.9)], false, 0).unwrap();
        assert_eq!(rec.sides, [None, None]);

        let rec = SourceRecord::from_slice("bet365", &[Some(1.9), Some(2.1), Some(3.0)], false, 0).unwrap();
        assert_eq!(rec.sides, [None, None]);

        let rec = SourceRecord::from_slice("bet365", &[Some(1.9), Some(2.1)], false, 0).unwrap();
        assert_eq!(rec.values(), Some([1.9, 2.1]));
    }

    #[test]
    fn test_index_mismatch_rules() {
        let mut status = ExternalStatus::default();
        assert!(!status.index_mismatch());

        status.set_expected_index(Some(1));
        status.set_observed_index(Some(0));
        // Observed 0 counts as the first index
        assert!(!status.index_mismatch());

        status.set_observed_index(Some(2));
        assert!(status.index_mismatch());

        status.set_expected_index(Some(9));
        assert_eq!(status.expected_index, None);
        assert!(!status.index_mismatch());
    }

    #[test]
    fn test_expected_index_zero_is_unknown() {
        let mut status = ExternalStatus::default();
        status.set_expected_index(Some(0));
        assert_eq!(status.expected_index, None);
    }

    #[test]
    fn test_merge_process_keeps_known_running() {
        let mut status = ExternalStatus::default();
        status.merge_process(ProcessHealth {
            running: Some(true),
            ..Default::default()
        });
        status.merge_process(ProcessHealth {
            starting: true,
            ..Default::default()
        });
        assert_eq!(status.process.running, Some(true));
        assert!(status.process.starting);
    }

    #[test]
    fn test_verdict_accessors() {
        let v = GuardVerdict::SoftSuspend {
            reason: ReasonCode::NoReference,
            user_initiated: false,
        };
        assert!(v.is_soft_suspend());
        assert!(!v.is_allowed());
        assert!(!v.is_hard_block());
        assert_eq!(v.reason(), Some(ReasonCode::NoReference));
        assert_eq!(GuardVerdict::Allowed.reason(), None);
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(ReasonCode::Manual.label(), "");
        assert_eq!(ReasonCode::NoReference.label(), "MID");
        assert_eq!(ReasonCode::SpreadSpike.label(), "ARB");
        assert_eq!(ReasonCode::ProcessOff.label(), "SCRIPT");
        assert_eq!(ReasonCode::IndexMismatch.to_string(), "index_mismatch");
    }
}
