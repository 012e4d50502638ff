//! GuardEvaluator: ordered preconditions checked before any actuation.
//!
//! Order is fixed and the first failing check wins:
//! 1. process health (script mode) / connectivity (service mode)
//! 2. index synchronization (script mode)
//! 3. target frozen by the operator
//! 4. no reference value (optional)
//! 5. spread at or above the shock threshold

use crate::config::{ControlConfig, GuardSettings, GuardSettingsUpdate, Mode, TargetIds};
use crate::core::types::{ExternalStatus, GuardVerdict, ReasonCode, Snapshot};

#[derive(Debug, Clone)]
pub struct GuardEvaluator {
    settings: GuardSettings,
    shock_threshold_pct: f64,
    /// Re-entry threshold for spread suspensions, below the shock threshold
    suspend_threshold_pct: f64,
    targets: TargetIds,
}

impl GuardEvaluator {
    pub fn new(settings: GuardSettings, config: &ControlConfig, targets: TargetIds) -> Self {
        Self {
            settings,
            shock_threshold_pct: config.shock_threshold_pct,
            suspend_threshold_pct: config.suspend_threshold_pct,
            targets,
        }
    }

    pub fn check(&self, snapshot: &Snapshot, mode: Mode, status: &ExternalStatus) -> GuardVerdict {
        self.evaluate(snapshot, mode, status, true)
    }

    /// Same order as `check`, minus the frozen-target check. Used while the
    /// target is frozen because the controller itself asked it to suspend.
    pub fn check_ignoring_frozen_target(
        &self,
        snapshot: &Snapshot,
        mode: Mode,
        status: &ExternalStatus,
    ) -> GuardVerdict {
        self.evaluate(snapshot, mode, status, false)
    }

    fn evaluate(
        &self,
        snapshot: &Snapshot,
        mode: Mode,
        status: &ExternalStatus,
        check_frozen: bool,
    ) -> GuardVerdict {
        let hard = |reason| GuardVerdict::HardBlock { reason };
        let soft = |reason| GuardVerdict::SoftSuspend {
            reason,
            user_initiated: false,
        };

        match mode {
            Mode::Script => {
                let process = &status.process;
                match process.running {
                    None => return hard(ReasonCode::ProcessUnknown),
                    _ if process.installing => return hard(ReasonCode::ProcessInstalling),
                    _ if process.starting => return hard(ReasonCode::ProcessStarting),
                    Some(false) => return hard(ReasonCode::ProcessOff),
                    Some(true) => {}
                }
                if status.index_mismatch() {
                    return hard(ReasonCode::IndexMismatch);
                }
            }
            Mode::Service => {
                if !status.connected {
                    return hard(ReasonCode::NotConnected);
                }
            }
        }

        if check_frozen && snapshot.is_frozen(self.targets.for_mode(mode)) {
            return GuardVerdict::SoftSuspend {
                reason: ReasonCode::PrimarySuspended,
                user_initiated: true,
            };
        }

        if self.settings.stop_on_no_reference && !snapshot.derived.has_reference() {
            return soft(ReasonCode::NoReference);
        }

        if let Some(spread) = snapshot.derived.spread_pct {
            if spread >= self.shock_threshold_pct {
                return soft(ReasonCode::SpreadSpike);
            }
        }

        GuardVerdict::Allowed
    }

    /// Whether a soft suspension for `reason` has cleared on its own.
    ///
    /// Hard-block reasons and coordinator-internal reasons never auto-resume.
    pub fn can_resume(&self, snapshot: &Snapshot, mode: Mode, reason: ReasonCode) -> bool {
        match reason {
            ReasonCode::PrimarySuspended => !snapshot.is_frozen(self.targets.for_mode(mode)),
            ReasonCode::NoReference => {
                self.settings.resume_on_reference && snapshot.derived.has_reference()
            }
            ReasonCode::SpreadSpike => match snapshot.derived.spread_pct {
                Some(spread) => spread < self.suspend_threshold_pct,
                None => true,
            },
            _ => false,
        }
    }

    pub fn sync_thresholds(&mut self, config: &ControlConfig) {
        self.shock_threshold_pct = config.shock_threshold_pct;
        self.suspend_threshold_pct = config.suspend_threshold_pct;
    }

    pub fn apply_settings(&mut self, update: &GuardSettingsUpdate) {
        self.settings.apply(update);
    }

    pub fn settings(&self) -> GuardSettings {
        self.settings
    }

    pub fn targets(&self) -> &TargetIds {
        &self.targets
    }
}
