//! Configuration types for the alignment controller
//!
//! This module defines all configuration structs that are loaded from YAML.
//! `ControlConfig` is owned by the coordinator at runtime and only changes
//! through `ConfigUpdate`, which clamps every field into its safe range.

use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::error::AppError;

// ============================================================================
// Enums
// ============================================================================

/// Which downstream target the controller is driving
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Locally supervised script process (health + index sync guarded)
    #[default]
    Script,
    /// Remote data service (connectivity guarded)
    Service,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Script => write!(f, "script"),
            Mode::Service => write!(f, "service"),
        }
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Runtime tunables of the alignment loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Allowed relative difference before correcting (percentage)
    pub tolerance_pct: f64,
    /// Regular step interval while trading
    pub interval_ms: u64,
    /// Relative difference covered by one pulse (percentage)
    pub pulse_step_pct: f64,
    /// Gap between pulses of one burst
    pub pulse_gap_ms: u64,
    /// Upper bound on pulses per burst
    pub max_pulses: u32,
    /// Same (side, key) may not fire again within this window
    pub fire_cooldown_ms: u64,
    /// Settle delay between the last pulse and the confirm key
    pub confirm_delay_ms: u64,
    /// Spread at or above this suspends (percentage)
    pub shock_threshold_pct: f64,
    /// Spread below this lets a spike suspension resume (percentage)
    pub suspend_threshold_pct: f64,
    /// Wall-clock bound on one alignment session
    pub alignment_timeout_ms: u64,
    /// Alignment loop re-check interval
    pub alignment_check_interval_ms: u64,
    /// Attempt bound on one alignment session
    pub max_alignment_attempts: u32,
    /// Delay before re-sending an unacknowledged suspend/resume signal
    pub suspend_retry_delay_ms: u64,
    /// Minimum time after a suspension before reactive resume
    pub resume_cooldown_ms: u64,
    /// Window after a resume signal in which a frozen target is ignored
    pub resume_grace_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
            interval_ms: DEFAULT_INTERVAL_MS,
            pulse_step_pct: DEFAULT_PULSE_STEP_PCT,
            pulse_gap_ms: DEFAULT_PULSE_GAP_MS,
            max_pulses: DEFAULT_MAX_PULSES,
            fire_cooldown_ms: DEFAULT_FIRE_COOLDOWN_MS,
            confirm_delay_ms: DEFAULT_CONFIRM_DELAY_MS,
            shock_threshold_pct: DEFAULT_SHOCK_THRESHOLD_PCT,
            suspend_threshold_pct: DEFAULT_SUSPEND_THRESHOLD_PCT,
            alignment_timeout_ms: DEFAULT_ALIGNMENT_TIMEOUT_MS,
            alignment_check_interval_ms: DEFAULT_ALIGNMENT_CHECK_INTERVAL_MS,
            max_alignment_attempts: DEFAULT_MAX_ALIGNMENT_ATTEMPTS,
            suspend_retry_delay_ms: DEFAULT_SUSPEND_RETRY_DELAY_MS,
            resume_cooldown_ms: DEFAULT_RESUME_COOLDOWN_MS,
            resume_grace_ms: DEFAULT_RESUME_GRACE_MS,
        }
    }
}

impl ControlConfig {
    /// Return a copy with every field clamped into its safe range.
    ///
    /// Fails only for values that cannot be clamped (NaN).
    pub fn clamped(&self) -> Result<Self, AppError> {
        let shock = clamp_pct("shock_threshold_pct", self.shock_threshold_pct, SHOCK_THRESHOLD_PCT_RANGE)?;
        Ok(Self {
            tolerance_pct: clamp_pct("tolerance_pct", self.tolerance_pct, TOLERANCE_PCT_RANGE)?,
            interval_ms: self.interval_ms.clamp(INTERVAL_MS_RANGE.0, INTERVAL_MS_RANGE.1),
            pulse_step_pct: clamp_pct("pulse_step_pct", self.pulse_step_pct, PULSE_STEP_PCT_RANGE)?,
            pulse_gap_ms: self.pulse_gap_ms.clamp(PULSE_GAP_MS_RANGE.0, PULSE_GAP_MS_RANGE.1),
            max_pulses: self.max_pulses.clamp(MAX_PULSES_RANGE.0, MAX_PULSES_RANGE.1),
            fire_cooldown_ms: self.fire_cooldown_ms.clamp(FIRE_COOLDOWN_MS_RANGE.0, FIRE_COOLDOWN_MS_RANGE.1),
            confirm_delay_ms: self.confirm_delay_ms.clamp(CONFIRM_DELAY_MS_RANGE.0, CONFIRM_DELAY_MS_RANGE.1),
            shock_threshold_pct: shock,
            // Re-entry threshold never exceeds the shock threshold
            suspend_threshold_pct: clamp_pct("suspend_threshold_pct", self.suspend_threshold_pct, (0.0, shock))?,
            alignment_timeout_ms: self
                .alignment_timeout_ms
                .clamp(ALIGNMENT_TIMEOUT_MS_RANGE.0, ALIGNMENT_TIMEOUT_MS_RANGE.1),
            alignment_check_interval_ms: self
                .alignment_check_interval_ms
                .clamp(ALIGNMENT_CHECK_INTERVAL_MS_RANGE.0, ALIGNMENT_CHECK_INTERVAL_MS_RANGE.1),
            max_alignment_attempts: self
                .max_alignment_attempts
                .clamp(MAX_ALIGNMENT_ATTEMPTS_RANGE.0, MAX_ALIGNMENT_ATTEMPTS_RANGE.1),
            suspend_retry_delay_ms: self
                .suspend_retry_delay_ms
                .clamp(SUSPEND_RETRY_DELAY_MS_RANGE.0, SUSPEND_RETRY_DELAY_MS_RANGE.1),
            resume_cooldown_ms: self
                .resume_cooldown_ms
                .clamp(RESUME_COOLDOWN_MS_RANGE.0, RESUME_COOLDOWN_MS_RANGE.1),
            resume_grace_ms: self.resume_grace_ms.clamp(RESUME_GRACE_MS_RANGE.0, RESUME_GRACE_MS_RANGE.1),
        })
    }

    /// Merge a partial update, then clamp the result.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<Self, AppError> {
        let mut next = *self;
        if let Some(v) = update.tolerance_pct {
            next.tolerance_pct = v;
        }
        if let Some(v) = update.interval_ms {
            next.interval_ms = v;
        }
        if let Some(v) = update.pulse_step_pct {
            next.pulse_step_pct = v;
        }
        if let Some(v) = update.pulse_gap_ms {
            next.pulse_gap_ms = v;
        }
        if let Some(v) = update.max_pulses {
            next.max_pulses = v;
        }
        if let Some(v) = update.fire_cooldown_ms {
            next.fire_cooldown_ms = v;
        }
        if let Some(v) = update.confirm_delay_ms {
            next.confirm_delay_ms = v;
        }
        if let Some(v) = update.shock_threshold_pct {
            next.shock_threshold_pct = v;
        }
        if let Some(v) = update.suspend_threshold_pct {
            next.suspend_threshold_pct = v;
        }
        if let Some(v) = update.alignment_timeout_ms {
            next.alignment_timeout_ms = v;
        }
        if let Some(v) = update.alignment_check_interval_ms {
            next.alignment_check_interval_ms = v;
        }
        if let Some(v) = update.max_alignment_attempts {
            next.max_alignment_attempts = v;
        }
        if let Some(v) = update.suspend_retry_delay_ms {
            next.suspend_retry_delay_ms = v;
        }
        if let Some(v) = update.resume_cooldown_ms {
            next.resume_cooldown_ms = v;
        }
        if let Some(v) = update.resume_grace_ms {
            next.resume_grace_ms = v;
        }
        next.clamped()
    }
}

/// Partial config payload for `Coordinator::set_config`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub tolerance_pct: Option<f64>,
    pub interval_ms: Option<u64>,
    pub pulse_step_pct: Option<f64>,
    pub pulse_gap_ms: Option<u64>,
    pub max_pulses: Option<u32>,
    pub fire_cooldown_ms: Option<u64>,
    pub confirm_delay_ms: Option<u64>,
    pub shock_threshold_pct: Option<f64>,
    pub suspend_threshold_pct: Option<f64>,
    pub alignment_timeout_ms: Option<u64>,
    pub alignment_check_interval_ms: Option<u64>,
    pub max_alignment_attempts: Option<u32>,
    pub suspend_retry_delay_ms: Option<u64>,
    pub resume_cooldown_ms: Option<u64>,
    pub resume_grace_ms: Option<u64>,
}

/// Guard switches that are not numeric thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Suspend when no reference value is available
    pub stop_on_no_reference: bool,
    /// Allow a `NoReference` suspension to resume by itself
    pub resume_on_reference: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            stop_on_no_reference: true,
            resume_on_reference: true,
        }
    }
}

/// Partial guard settings payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettingsUpdate {
    pub stop_on_no_reference: Option<bool>,
    pub resume_on_reference: Option<bool>,
}

impl GuardSettings {
    pub fn apply(&mut self, update: &GuardSettingsUpdate) {
        if let Some(v) = update.stop_on_no_reference {
            self.stop_on_no_reference = v;
        }
        if let Some(v) = update.resume_on_reference {
            self.resume_on_reference = v;
        }
    }
}

/// Source ids reserved for the controller's own targets.
///
/// These feeds are never part of the reference computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetIds {
    pub script: String,
    pub service: String,
}

impl Default for TargetIds {
    fn default() -> Self {
        Self {
            script: "excel".to_string(),
            service: "ds".to_string(),
        }
    }
}

impl TargetIds {
    /// Source id of the target driven in `mode`
    pub fn for_mode(&self, mode: Mode) -> &str {
        match mode {
            Mode::Script => &self.script,
            Mode::Service => &self.service,
        }
    }

    pub fn is_reserved(&self, source_id: &str) -> bool {
        source_id == self.script || source_id == self.service
    }
}

/// Root application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Alignment loop tunables
    pub control: ControlConfig,
    /// Guard switches
    pub guard: GuardSettings,
    /// Reserved target source ids
    pub targets: TargetIds,
    /// Mode at startup
    pub mode: Mode,
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        if self.targets.script.trim().is_empty() || self.targets.service.trim().is_empty() {
            return Err(AppError::Config("Target source ids cannot be empty".to_string()));
        }

        if self.targets.script == self.targets.service {
            return Err(AppError::Config(format!(
                "targets.script and targets.service cannot be the same (both are '{}')",
                self.targets.script
            )));
        }

        let c = &self.control;
        for (name, value) in [
            ("tolerance_pct", c.tolerance_pct),
            ("pulse_step_pct", c.pulse_step_pct),
            ("shock_threshold_pct", c.shock_threshold_pct),
            ("suspend_threshold_pct", c.suspend_threshold_pct),
        ] {
            if !value.is_finite() {
                return Err(AppError::Config(format!(
                    "control.{} must be a finite number (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

fn clamp_pct(name: &str, value: f64, range: (f64, f64)) -> Result<f64, AppError> {
    if value.is_nan() {
        return Err(AppError::Config(format!("{} cannot be NaN", name)));
    }
    Ok(value.clamp(range.0, range.1))
}

// ============================================================================
// Tests
// ============================================================================
