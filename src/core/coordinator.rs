//! Coordinator: the Idle / Aligning / Trading state machine.
//!
//! The coordinator performs no IO of its own. Entry points take the current
//! store snapshot; deferred work (steps, alignment re-checks, spaced pulses,
//! signal retries) sits in an internal `TimerQueue` that the owner drives via
//! `next_deadline()` and `fire_due()`.
//!
//! Every deferred entry carries the epoch it was scheduled in. `enable`,
//! `disable`, suspensions and resumes bump the epoch, so entries from an
//! abandoned session come due as no-ops.

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::config::constants::{
    self, ALIGNMENT_COOLDOWN_MARGIN_MS, TARGET_UPDATE_CHECK_INTERVAL_MS,
};
use crate::config::{AppConfig, ConfigUpdate, GuardSettings, GuardSettingsUpdate, Mode};
use crate::core::actuator::{Actuator, ActuatorCommand, CommandKind};
use crate::core::clock::Clock;
use crate::core::engine::{AlignmentEngine, EngineConfig};
use crate::core::events::{format_pct, log_event, ControlEvent};
use crate::core::guard::GuardEvaluator;
use crate::core::timers::{BurstKey, Timer, TimerKind, TimerQueue};
use crate::core::types::{
    AlignAction, ControlSignal, CoordinatorState, ExternalStatus, GuardVerdict, Key, Phase,
    ProcessHealth, ReasonCode, SignalKind, Snapshot,
};
use crate::error::AppError;

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct AlignmentSession {
    started_ms: u64,
    attempts: u32,
}

/// Target values captured right after a burst
#[derive(Debug, Clone, Copy)]
struct TargetWait {
    before: Option<[f64; 2]>,
    since_ms: u64,
}

pub struct Coordinator<A: Actuator> {
    state: CoordinatorState,
    engine: AlignmentEngine,
    guard: GuardEvaluator,
    status: ExternalStatus,
    actuator: A,
    clock: Box<dyn Clock>,
    timers: TimerQueue,
    state_tx: watch::Sender<CoordinatorState>,
    signal_tx: broadcast::Sender<ControlSignal>,
    alignment: Option<AlignmentSession>,
    target_wait: Option<TargetWait>,
    target_update_timeout_ms: u64,
    last_suspend_ms: Option<u64>,
    last_resume_signal_ms: Option<u64>,
    /// The target is frozen because we sent it the suspend signal
    frozen_by_signal: bool,
    /// Send the resume key on the next entry into Trading
    resume_signal_pending: bool,
    /// Reason of the suspension a reactive resume cleared
    resumed_from: Option<ReasonCode>,
}

impl<A: Actuator> Coordinator<A> {
    pub fn new(config: &AppConfig, actuator: A, clock: Box<dyn Clock>) -> Result<Self, AppError> {
        config.validate()?;
        let control = config.control.clamped()?;
        let state = CoordinatorState::initial(config.mode, control);
        let (state_tx, _) = watch::channel(state.clone());
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);

        Ok(Self {
            state,
            engine: AlignmentEngine::new(EngineConfig::from(&control)),
            guard: GuardEvaluator::new(config.guard, &control, config.targets.clone()),
            status: ExternalStatus::default(),
            actuator,
            clock,
            timers: TimerQueue::new(),
            state_tx,
            signal_tx,
            alignment: None,
            target_wait: None,
            target_update_timeout_ms: constants::target_update_timeout_ms(),
            last_suspend_ms: None,
            last_resume_signal_ms: None,
            frozen_by_signal: false,
            resume_signal_pending: false,
            resumed_from: None,
        })
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// State feed: the receiver sees the current state and every later change
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Suspend/resume notifications
    pub fn signals(&self) -> broadcast::Receiver<ControlSignal> {
        self.signal_tx.subscribe()
    }

    pub fn external_status(&self) -> &ExternalStatus {
        &self.status
    }

    pub fn guard_settings(&self) -> GuardSettings {
        self.guard.settings()
    }

    /// Source id of the target driven in the current mode
    pub fn target_id(&self) -> &str {
        self.guard.targets().for_mode(self.state.mode)
    }

    /// Guard verdict as the coordinator would see it right now
    pub fn check_guards(&self, snapshot: &Snapshot) -> GuardVerdict {
        self.verdict(snapshot, self.clock.now_ms())
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // =========================================================================
    // User operations
    // =========================================================================

    /// Returns false when a hard block keeps the coordinator idle.
    pub fn enable(&mut self, snapshot: &Snapshot) -> bool {
        if self.state.active {
            return true;
        }

        let now = self.clock.now_ms();
        let verdict = self.verdict(snapshot, now);
        if let GuardVerdict::HardBlock { reason } = verdict {
            self.state.reason = Some(reason);
            self.state.status = format!("Blocked: {}", reason.label());
            log_event(&ControlEvent::blocked(self.state.mode, reason));
            self.publish();
            return false;
        }

        if let GuardVerdict::SoftSuspend {
            reason,
            user_initiated,
        } = verdict
        {
            self.wait_for_conditions(reason, user_initiated);
            log_event(&ControlEvent::enabled(self.state.mode, Phase::Idle, self.state.epoch));
            return true;
        }

        self.begin_session();
        self.state.user_wanted = true;
        self.state.user_suspended = false;
        self.state.reason = None;
        self.resume_signal_pending = self.frozen_by_signal;

        let check = self
            .engine
            .check_alignment(snapshot.derived.reference, self.target_values(snapshot));
        let phase = if check.aligned { Phase::Trading } else { Phase::Aligning };
        log_event(&ControlEvent::enabled(self.state.mode, phase, self.state.epoch));
        if check.aligned {
            self.enter_trading(snapshot, now);
        } else {
            self.start_alignment(snapshot, now);
        }
        true
    }

    pub fn disable(&mut self) {
        self.bump_epoch();
        self.timers.cancel_where(|k| !k.is_burst());
        self.alignment = None;
        self.target_wait = None;
        self.resume_signal_pending = false;
        self.resumed_from = None;

        self.state.active = false;
        self.state.user_wanted = false;
        self.state.user_suspended = false;
        self.state.phase = Phase::Idle;
        self.state.reason = Some(ReasonCode::Manual);
        self.state.status = String::new();

        log_event(&ControlEvent::disabled(self.state.epoch));
        self.publish();
    }

    /// Returns whether the coordinator is active afterwards.
    pub fn toggle(&mut self, snapshot: &Snapshot) -> bool {
        if self.state.active || self.state.user_wanted || self.state.user_suspended {
            self.disable();
            false
        } else {
            self.enable(snapshot)
        }
    }

    /// Switching mode never happens underneath a live session.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.state.mode == mode {
            return;
        }
        if self.state.active || self.state.user_wanted {
            self.disable();
        }
        self.state.mode = mode;
        self.frozen_by_signal = false;
        self.last_resume_signal_ms = None;
        self.target_wait = None;
        log_event(&ControlEvent::mode_changed(mode));
        self.publish();
    }

    /// Apply a partial config. Out-of-range values are clamped; NaN is an error.
    pub fn set_config(&mut self, update: &ConfigUpdate) -> Result<(), AppError> {
        let next = self.state.config.apply(update)?;
        self.state.config = next;
        self.engine.set_config(EngineConfig::from(&next));
        self.guard.sync_thresholds(&next);
        log_event(&ControlEvent::config_updated(format!(
            "tolerance={} interval={}ms pulse_step={} max_pulses={} shock={} resume_below={}",
            format_pct(next.tolerance_pct),
            next.interval_ms,
            format_pct(next.pulse_step_pct),
            next.max_pulses,
            format_pct(next.shock_threshold_pct),
            format_pct(next.suspend_threshold_pct),
        )));
        self.publish();
        Ok(())
    }

    pub fn set_guard_settings(&mut self, update: &GuardSettingsUpdate, snapshot: &Snapshot) {
        self.guard.apply_settings(update);
        self.on_snapshot(snapshot);
    }

    // =========================================================================
    // External status (each push is followed by a guard re-check)
    // =========================================================================

    pub fn set_external_status(&mut self, status: ExternalStatus, snapshot: &Snapshot) {
        self.status = status;
        self.on_snapshot(snapshot);
    }

    pub fn set_process_health(&mut self, health: ProcessHealth, snapshot: &Snapshot) {
        self.status.merge_process(health);
        self.on_snapshot(snapshot);
    }

    pub fn set_connected(&mut self, connected: bool, snapshot: &Snapshot) {
        self.status.connected = connected;
        self.on_snapshot(snapshot);
    }

    pub fn set_expected_index(&mut self, index: Option<i64>, snapshot: &Snapshot) {
        self.status.set_expected_index(index);
        self.on_snapshot(snapshot);
    }

    pub fn set_observed_index(&mut self, index: Option<i64>, snapshot: &Snapshot) {
        self.status.set_observed_index(index);
        self.on_snapshot(snapshot);
    }

    // =========================================================================
    // Reactive path
    // =========================================================================

    /// React to a store change: suspend a live session whose guards failed,
    /// or resume a suspended one whose condition cleared.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) {
        if !self.state.active && !self.state.user_wanted {
            return;
        }
        let now = self.clock.now_ms();
        let verdict = self.verdict(snapshot, now);

        if self.state.active {
            if !verdict.is_allowed() {
                self.suspend(verdict, now);
            }
        } else if let GuardVerdict::HardBlock { reason } = verdict {
            self.withdraw(reason);
        } else {
            self.try_resume(snapshot, verdict, now);
        }
    }

    /// Run every timer whose deadline has passed. Returns how many came due.
    pub fn fire_due(&mut self, snapshot: &Snapshot) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(self.clock.now_ms()) {
            fired += 1;
            self.on_timer(timer, snapshot);
        }
        fired
    }

    fn on_timer(&mut self, timer: Timer, snapshot: &Snapshot) {
        let current = timer.epoch == self.state.epoch;
        let live = current && self.state.active;
        let now = self.clock.now_ms();

        match timer.kind {
            TimerKind::Step if live => self.step(snapshot),
            TimerKind::AlignmentCheck if live => self.check_alignment_progress(snapshot),
            TimerKind::Pulse(b) if live => {
                let kind = CommandKind::Pulse {
                    side: b.side,
                    direction: b.direction,
                    diff_pct: b.diff_pct,
                    index: b.index,
                    of: b.of,
                };
                self.dispatch(ActuatorCommand::new(b.key, kind, now));
            }
            TimerKind::Confirm(b) if live => {
                let kind = CommandKind::Confirm {
                    side: b.side,
                    direction: b.direction,
                    diff_pct: b.diff_pct,
                };
                self.dispatch(ActuatorCommand::new(Key::CONFIRM, kind, now));
            }
            TimerKind::SignalRetry { kind, reason } if current => {
                let frozen = snapshot.is_frozen(self.target_id());
                let unacknowledged = match kind {
                    SignalKind::Suspend => !frozen,
                    SignalKind::Resume => frozen,
                };
                if unacknowledged {
                    debug!(signal = ?kind, reason = ?reason, "Target did not react, re-sending signal");
                    self.send_signal(kind, reason, true, now);
                }
            }
            TimerKind::ResumeCheck if current && !self.state.active && self.state.user_wanted => {
                self.on_snapshot(snapshot)
            }
            kind => debug!(
                timer_epoch = timer.epoch,
                epoch = self.state.epoch,
                kind = ?kind,
                "Stale timer dropped"
            ),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Enabled under a soft condition: nothing has run yet, so the target is
    /// left alone and reactive resume starts the session once it clears.
    fn wait_for_conditions(&mut self, reason: ReasonCode, user_initiated: bool) {
        self.bump_epoch();
        self.timers.cancel_where(|k| !k.is_burst());
        self.resume_signal_pending = false;
        self.resumed_from = None;

        self.state.active = false;
        self.state.phase = Phase::Idle;
        self.state.user_wanted = true;
        self.state.user_suspended = user_initiated;
        self.state.reason = Some(reason);
        self.state.status = if user_initiated {
            "Paused by operator".to_string()
        } else {
            format!("Waiting: {}", reason.label())
        };
        self.publish();
    }

    /// A hard block while waiting to resume ends the user's intent.
    /// A pending suspend-signal retry stays scheduled.
    fn withdraw(&mut self, reason: ReasonCode) {
        self.timers.cancel_where(|k| matches!(k, TimerKind::ResumeCheck));
        self.state.user_wanted = false;
        self.state.user_suspended = false;
        self.state.reason = Some(reason);
        self.state.status = format!("Blocked: {}", reason.label());
        log_event(&ControlEvent::blocked(self.state.mode, reason));
        self.publish();
    }

    fn try_resume(&mut self, snapshot: &Snapshot, verdict: GuardVerdict, now: u64) {
        let Some(reason) = self.state.reason else {
            return;
        };
        if !verdict.is_allowed() {
            return;
        }
        if let Some(at) = self.last_suspend_ms {
            let ready_at = at.saturating_add(self.state.config.resume_cooldown_ms);
            if now < ready_at {
                self.timers.schedule(ready_at, self.state.epoch, TimerKind::ResumeCheck);
                return;
            }
        }
        if !self.guard.can_resume(snapshot, self.state.mode, reason) {
            return;
        }

        self.begin_session();
        self.state.user_suspended = false;
        self.resume_signal_pending = self.frozen_by_signal;
        self.resumed_from = Some(reason);
        log_event(&ControlEvent::resumed(reason, self.state.mode));
        self.start_alignment(snapshot, now);
    }

    fn start_alignment(&mut self, snapshot: &Snapshot, now: u64) {
        self.state.phase = Phase::Aligning;
        self.state.reason = Some(ReasonCode::Aligning);
        self.state.status = "Aligning...".to_string();
        self.alignment = Some(AlignmentSession {
            started_ms: now,
            attempts: 0,
        });
        self.engine.reset_cooldown();
        log_event(&ControlEvent::align_started(self.state.epoch));
        self.publish();
        self.check_alignment_progress(snapshot);
    }

    fn check_alignment_progress(&mut self, snapshot: &Snapshot) {
        if !self.state.active || self.state.phase != Phase::Aligning {
            return;
        }
        let Some(mut session) = self.alignment else {
            return;
        };

        let now = self.clock.now_ms();
        let verdict = self.verdict(snapshot, now);
        if !verdict.is_allowed() {
            self.suspend(verdict, now);
            return;
        }

        session.attempts += 1;
        self.alignment = Some(session);

        let check = self
            .engine
            .check_alignment(snapshot.derived.reference, self.target_values(snapshot));
        if check.aligned {
            log_event(&ControlEvent::aligned(session.attempts, check.diff_pct));
            self.enter_trading(snapshot, now);
            return;
        }

        let cfg = self.state.config;
        let elapsed = now.saturating_sub(session.started_ms);
        if elapsed >= cfg.alignment_timeout_ms {
            self.fail_alignment(session.attempts, check.diff_pct, "timeout", now);
            return;
        }
        if session.attempts >= cfg.max_alignment_attempts {
            self.fail_alignment(session.attempts, check.diff_pct, "attempts", now);
            return;
        }

        self.step(snapshot);

        if self.state.active && self.state.phase == Phase::Aligning {
            let interval = cfg
                .alignment_check_interval_ms
                .max(cfg.fire_cooldown_ms + ALIGNMENT_COOLDOWN_MARGIN_MS);
            self.timers
                .schedule(now + interval, self.state.epoch, TimerKind::AlignmentCheck);
        }
    }

    fn enter_trading(&mut self, snapshot: &Snapshot, now: u64) {
        self.alignment = None;
        self.state.phase = Phase::Trading;
        self.state.reason = None;
        self.state.status = "Trading".to_string();
        let resumed_from = self.resumed_from.take();
        self.broadcast(SignalKind::Resume, resumed_from, now);

        if self.resume_signal_pending {
            self.resume_signal_pending = false;
            self.frozen_by_signal = false;
            self.last_resume_signal_ms = Some(now);
            self.send_signal(SignalKind::Resume, None, false, now);
            self.timers.schedule(
                now + self.state.config.suspend_retry_delay_ms,
                self.state.epoch,
                TimerKind::SignalRetry {
                    kind: SignalKind::Resume,
                    reason: None,
                },
            );
        }

        self.publish();
        self.step(snapshot);
    }

    fn fail_alignment(&mut self, attempts: u32, diff_pct: Option<f64>, cause: &str, now: u64) {
        self.end_session();
        self.state.phase = Phase::Idle;
        self.state.reason = Some(ReasonCode::AlignFailed);
        self.state.status = format!("Align failed: {}", cause);
        self.last_suspend_ms = Some(now);

        self.broadcast(SignalKind::Suspend, Some(ReasonCode::AlignFailed), now);
        log_event(&ControlEvent::align_failed(attempts, diff_pct, cause));
        self.publish();
    }

    /// Guard-triggered stop. Hard blocks also withdraw `user_wanted`.
    fn suspend(&mut self, verdict: GuardVerdict, now: u64) {
        let (reason, hard, user_initiated) = match verdict {
            GuardVerdict::Allowed => return,
            GuardVerdict::HardBlock { reason } => (reason, true, false),
            GuardVerdict::SoftSuspend {
                reason,
                user_initiated,
            } => (reason, false, user_initiated),
        };

        self.end_session();
        self.state.phase = Phase::Idle;
        self.state.reason = Some(reason);
        if hard {
            self.state.user_wanted = false;
        }

        if user_initiated {
            // The operator froze the target; nothing to tell it
            self.state.user_suspended = true;
            self.state.status = "Paused by operator".to_string();
        } else {
            self.send_signal(SignalKind::Suspend, Some(reason), false, now);
            self.frozen_by_signal = true;
            self.timers.schedule(
                now + self.state.config.suspend_retry_delay_ms,
                self.state.epoch,
                TimerKind::SignalRetry {
                    kind: SignalKind::Suspend,
                    reason: Some(reason),
                },
            );
            let prefix = if hard { "Blocked" } else { "Suspended" };
            self.state.status = format!("{}: {}", prefix, reason.label());
        }

        self.last_suspend_ms = Some(now);
        self.broadcast(SignalKind::Suspend, Some(reason), now);
        log_event(&ControlEvent::suspended(reason, self.state.mode, hard));
        self.publish();

        if self.state.user_wanted {
            self.timers.schedule(
                now + self.state.config.resume_cooldown_ms,
                self.state.epoch,
                TimerKind::ResumeCheck,
            );
        }
    }

    // =========================================================================
    // Step
    // =========================================================================

    /// One pass: guards, then decision, then (deferred) dispatch.
    fn step(&mut self, snapshot: &Snapshot) {
        if !self.state.active {
            return;
        }
        let now = self.clock.now_ms();
        let aligning = self.state.phase == Phase::Aligning;

        let verdict = self.verdict(snapshot, now);
        if !verdict.is_allowed() {
            self.suspend(verdict, now);
            return;
        }

        let target = self.target_values(snapshot);
        let action = self.engine.compute_action(snapshot.derived.reference, target);
        let mut next_step_ms = self.state.config.interval_ms;

        match action {
            AlignAction::None { aligned: true, .. } => {
                if !aligning {
                    self.state.status = "Trading".to_string();
                }
            }
            AlignAction::None { aligned: false, .. } => {
                self.state.status = "No data".to_string();
            }
            AlignAction::Pulse { .. } => {
                if !self.target_updated(snapshot, now) {
                    self.state.status = "Waiting for target...".to_string();
                    next_step_ms = TARGET_UPDATE_CHECK_INTERVAL_MS;
                } else if self
                    .engine
                    .is_on_cooldown(&action, self.state.config.fire_cooldown_ms, now)
                {
                    self.state.status = "Cooldown...".to_string();
                } else {
                    self.fire_burst(&action, now);
                    self.target_wait = Some(TargetWait {
                        before: target,
                        since_ms: now,
                    });
                }
            }
        }

        if !aligning {
            self.timers
                .schedule(now + next_step_ms, self.state.epoch, TimerKind::Step);
        }
        self.publish();
    }

    /// Schedule the pulses and the confirm key; nothing is dispatched inline.
    fn fire_burst(&mut self, action: &AlignAction, now: u64) {
        let AlignAction::Pulse {
            key,
            side,
            direction,
            pulses,
            diff_pct,
        } = *action
        else {
            return;
        };

        let gap = self.state.config.pulse_gap_ms;
        let epoch = self.state.epoch;
        for i in 0..pulses {
            let burst = BurstKey {
                key,
                side,
                direction,
                diff_pct,
                index: i + 1,
                of: pulses,
            };
            self.timers
                .schedule(now + u64::from(i) * gap, epoch, TimerKind::Pulse(burst));
        }

        let confirm_at =
            now + u64::from(pulses.saturating_sub(1)) * gap + self.state.config.confirm_delay_ms;
        let confirm = BurstKey {
            key: Key::CONFIRM,
            side,
            direction,
            diff_pct,
            index: pulses,
            of: pulses,
        };
        self.timers.schedule(confirm_at, epoch, TimerKind::Confirm(confirm));

        self.engine.record_fire(action, now);
        self.state.status = format!("{} {} {}", direction, side, format_pct(diff_pct));
        log_event(&ControlEvent::pulse_burst(key, side, direction, pulses, diff_pct));
    }

    /// After a burst, hold further bursts until the target moves or the wait times out.
    fn target_updated(&mut self, snapshot: &Snapshot, now: u64) -> bool {
        let Some(wait) = self.target_wait else {
            return true;
        };
        if now.saturating_sub(wait.since_ms) > self.target_update_timeout_ms {
            self.target_wait = None;
            return true;
        }
        match (self.target_values(snapshot), wait.before) {
            (Some(current), Some(before)) if current != before => {
                self.target_wait = None;
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn verdict(&self, snapshot: &Snapshot, now: u64) -> GuardVerdict {
        if self.frozen_by_signal || self.in_resume_grace(now) {
            self.guard
                .check_ignoring_frozen_target(snapshot, self.state.mode, &self.status)
        } else {
            self.guard.check(snapshot, self.state.mode, &self.status)
        }
    }

    fn in_resume_grace(&self, now: u64) -> bool {
        self.last_resume_signal_ms
            .map(|at| now.saturating_sub(at) < self.state.config.resume_grace_ms)
            .unwrap_or(false)
    }

    fn target_values(&self, snapshot: &Snapshot) -> Option<[f64; 2]> {
        snapshot.values_of(self.target_id())
    }

    /// New epoch, fresh engine ledger, coordinator active.
    fn begin_session(&mut self) {
        self.bump_epoch();
        self.timers.cancel_where(|k| !k.is_burst());
        self.alignment = None;
        self.target_wait = None;
        self.engine.reset_cooldown();
        self.state.active = true;
    }

    /// New epoch, session timers dropped, coordinator inactive.
    fn end_session(&mut self) {
        self.bump_epoch();
        self.timers.cancel_where(|k| !k.is_burst());
        self.alignment = None;
        self.target_wait = None;
        self.resume_signal_pending = false;
        self.resumed_from = None;
        self.state.active = false;
    }

    fn bump_epoch(&mut self) {
        self.state.epoch = self.state.epoch.wrapping_add(1);
    }

    fn send_signal(&self, kind: SignalKind, reason: Option<ReasonCode>, retry: bool, now: u64) {
        let command = ActuatorCommand::new(
            Key::SIGNAL,
            CommandKind::Signal {
                signal: kind,
                reason,
                retry,
            },
            now,
        );
        self.dispatch(command);
    }

    /// Best effort: failures are logged and otherwise ignored.
    fn dispatch(&self, command: ActuatorCommand) {
        if let Err(e) = self.actuator.dispatch(&command) {
            log_event(&ControlEvent::dispatch_failed(command.key, &e.to_string()));
        }
    }

    fn broadcast(&self, kind: SignalKind, reason: Option<ReasonCode>, now: u64) {
        // No receivers is fine
        let _ = self.signal_tx.send(ControlSignal {
            kind,
            reason,
            at_ms: now,
        });
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|current| {
            if *current != self.state {
                *current = self.state.clone();
                true
            } else {
                false
            }
        });
    }
}
