//! AlignmentEngine: proportional pulse decisions and per-key cooldown ledger.
//!
//! Only the lower-valued reference side is corrected per step. A fixed nudge
//! moves the smaller value proportionally more, so it is the side whose
//! relative difference matters.

use crate::config::ControlConfig;
use crate::core::types::{AlignAction, AlignmentCheck, Direction, Key, Side};

/// Subset of `ControlConfig` the engine needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub tolerance_pct: f64,
    pub pulse_step_pct: f64,
    pub max_pulses: u32,
}

impl From<&ControlConfig> for EngineConfig {
    fn from(config: &ControlConfig) -> Self {
        Self {
            tolerance_pct: config.tolerance_pct,
            pulse_step_pct: config.pulse_step_pct,
            max_pulses: config.max_pulses,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}

/// Last fire, for cooldown checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FireLedger {
    last: Option<(Side, Key, u64)>,
}

#[derive(Debug, Clone, Default)]
pub struct AlignmentEngine {
    config: EngineConfig,
    ledger: FireLedger,
}

impl AlignmentEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ledger: FireLedger::default(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Decide what to fire for one step. Pure: the ledger is untouched.
    pub fn compute_action(&self, reference: Option<[f64; 2]>, target: Option<[f64; 2]>) -> AlignAction {
        let (Some(reference), Some(target)) = (reference, target) else {
            return AlignAction::NO_INPUT;
        };

        let side = sensitive_side(&reference);
        let i = side.index();
        let diff_pct = relative_diff_pct(target[i], reference[i]);

        if diff_pct <= self.config.tolerance_pct {
            return AlignAction::None {
                aligned: true,
                diff_pct: Some(diff_pct),
            };
        }

        let direction = if target[i] < reference[i] {
            Direction::Raise
        } else {
            Direction::Lower
        };

        AlignAction::Pulse {
            key: Key::for_pulse(side, direction),
            side,
            direction,
            pulses: pulse_count(diff_pct, self.config.pulse_step_pct, self.config.max_pulses),
            diff_pct,
        }
    }

    /// Tolerance check only, for the alignment loop
    pub fn check_alignment(&self, reference: Option<[f64; 2]>, target: Option<[f64; 2]>) -> AlignmentCheck {
        let (Some(reference), Some(target)) = (reference, target) else {
            return AlignmentCheck {
                aligned: false,
                diff_pct: None,
                side: Side::First,
            };
        };
        let side = sensitive_side(&reference);
        let diff_pct = relative_diff_pct(target[side.index()], reference[side.index()]);
        AlignmentCheck {
            aligned: diff_pct <= self.config.tolerance_pct,
            diff_pct: Some(diff_pct),
            side,
        }
    }

    /// True only if the same (side, key) fired less than `cooldown_ms` ago.
    pub fn is_on_cooldown(&self, action: &AlignAction, cooldown_ms: u64, now_ms: u64) -> bool {
        let AlignAction::Pulse { side, key, .. } = action else {
            return false;
        };
        match self.ledger.last {
            Some((last_side, last_key, at_ms)) => {
                last_side == *side && last_key == *key && now_ms.saturating_sub(at_ms) < cooldown_ms
            }
            None => false,
        }
    }

    pub fn record_fire(&mut self, action: &AlignAction, now_ms: u64) {
        if let AlignAction::Pulse { side, key, .. } = action {
            self.ledger.last = Some((*side, *key, now_ms));
        }
    }

    pub fn reset_cooldown(&mut self) {
        self.ledger = FireLedger::default();
    }

    pub fn last_fire_ms(&self) -> Option<u64> {
        self.ledger.last.map(|(_, _, at)| at)
    }
}

#[inline]
fn sensitive_side(reference: &[f64; 2]) -> Side {
    if reference[0] <= reference[1] {
        Side::First
    } else {
        Side::Second
    }
}

#[inline]
fn relative_diff_pct(target: f64, reference: f64) -> f64 {
    (target - reference).abs() / reference * 100.0
}

/// `clamp(floor(diff / step), 1, max)`
#[inline]
pub fn pulse_count(diff_pct: f64, pulse_step_pct: f64, max_pulses: u32) -> u32 {
    let raw = (diff_pct / pulse_step_pct).floor();
    let max = max_pulses.max(1);
    if raw >= max as f64 {
        max
    } else if raw < 1.0 {
        1
    } else {
        raw as u32
    }
}
