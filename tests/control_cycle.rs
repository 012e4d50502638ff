//! End-to-end control cycles through the public runtime API.
//!
//! Time is driven by a `ManualClock`; key presses land in a `RecordingActuator`.

use odds_align::config::{AppConfig, ConfigUpdate, Mode};
use odds_align::core::{
    parse_event, route, AlignAction, AlignmentEngine, CommandKind, ControlCommand, ControlRuntime,
    Clock, Direction, EngineConfig, IngestEvent, Key, ManualClock, Phase, ProcessHealth, ReasonCode,
    RecordingActuator, Routed, Side, SignalKind, SourceRecord,
};

const START_MS: u64 = 10_000;

struct Rig {
    runtime: ControlRuntime<RecordingActuator>,
    actuator: RecordingActuator,
    clock: ManualClock,
}

impl Rig {
    fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    fn with_config(config: AppConfig) -> Self {
        let clock = ManualClock::new(START_MS);
        let actuator = RecordingActuator::new();
        let runtime =
            ControlRuntime::new(&config, actuator.clone(), Box::new(clock.clone())).unwrap();
        let mut rig = Self {
            runtime,
            actuator,
            clock,
        };
        rig.command(ControlCommand::ProcessHealth(ProcessHealth {
            running: Some(true),
            ..Default::default()
        }));
        rig
    }

    fn record(&mut self, id: &str, a: f64, b: f64, frozen: bool) {
        let record =
            SourceRecord::new(id, [Some(a), Some(b)], frozen, self.clock.now_ms()).unwrap();
        self.runtime.on_ingest(IngestEvent::Record(record)).unwrap();
    }

    fn remove(&mut self, id: &str) {
        self.runtime
            .on_ingest(IngestEvent::Removed(id.to_string()))
            .unwrap();
    }

    fn command(&mut self, command: ControlCommand) {
        self.runtime.on_command(command).unwrap();
    }

    fn wire(&mut self, json: &str) {
        match route(parse_event(json).unwrap(), self.clock.now_ms()).unwrap() {
            Routed::Ingest(event) => self.runtime.on_ingest(event).unwrap(),
            Routed::Command(command) => self.runtime.on_command(command).unwrap(),
        }
    }

    fn run_until(&mut self, until: u64) {
        while let Some(deadline) = self.runtime.next_deadline_ms() {
            if deadline > until {
                break;
            }
            self.clock.set(deadline.max(self.clock.now_ms()));
            self.runtime.on_timers();
        }
        self.clock.set(until);
    }

    fn run_for(&mut self, ms: u64) {
        let until = self.clock.now_ms() + ms;
        self.run_until(until);
    }

    fn signal_kinds(&self) -> Vec<(SignalKind, bool)> {
        self.actuator
            .commands()
            .iter()
            .filter_map(|c| match c.kind {
                CommandKind::Signal { signal, retry, .. } => Some((signal, retry)),
                _ => None,
            })
            .collect()
    }

    /// Reference [2.0, 3.0] with the target 32% low on the first side
    fn misaligned(&mut self) {
        self.record("book-a", 2.0, 3.0, false);
        self.record("excel", 1.36, 3.0, false);
    }

    /// Reference and target both at [1.8, 2.0]
    fn aligned(&mut self) {
        self.record("book-a", 1.8, 2.0, false);
        self.record("excel", 1.8, 2.0, false);
    }
}

fn engine() -> AlignmentEngine {
    AlignmentEngine::new(EngineConfig {
        tolerance_pct: 1.5,
        pulse_step_pct: 10.0,
        max_pulses: 3,
    })
}

// =============================================================================
// Alignment decisions
// =============================================================================

#[test]
fn test_small_gap_on_first_side_is_one_pulse() {
    let action = engine().compute_action(Some([1.80, 2.00]), Some([1.90, 1.95]));
    let AlignAction::Pulse {
        side,
        direction,
        pulses,
        diff_pct,
        key,
    } = action
    else {
        panic!("expected a pulse, got {:?}", action);
    };
    assert_eq!(side, Side::First);
    assert_eq!(pulses, 1);
    assert!((diff_pct - 5.5556).abs() < 0.001);
    // Target sits above the reference, so it is pulled down
    assert_eq!(direction, Direction::Lower);
    assert_eq!(key, Key::F23);
}

#[test]
fn test_large_gap_is_clamped_to_max_pulses() {
    let action = engine().compute_action(Some([2.0, 3.0]), Some([1.36, 3.0]));
    assert!(matches!(
        action,
        AlignAction::Pulse {
            pulses: 3,
            direction: Direction::Raise,
            key: Key::F24,
            ..
        }
    ));
}

#[test]
fn test_tolerance_boundary_is_inclusive() {
    let action = engine().compute_action(Some([200.0, 300.0]), Some([203.0, 300.0]));
    assert_eq!(
        action,
        AlignAction::None {
            aligned: true,
            diff_pct: Some(1.5)
        }
    );
}

#[test]
fn test_cooldown_is_per_side_and_key() {
    let mut engine = engine();
    let first = engine.compute_action(Some([2.0, 3.0]), Some([1.8, 3.0]));
    let second = engine.compute_action(Some([3.0, 2.0]), Some([3.0, 1.8]));
    assert!(first.is_pulse() && second.is_pulse());

    engine.record_fire(&first, 1_000);
    assert!(engine.is_on_cooldown(&first, 900, 1_500));
    assert!(!engine.is_on_cooldown(&second, 900, 1_500));
    assert!(!engine.is_on_cooldown(&first, 900, 1_900));
}

// =============================================================================
// Coordinator lifecycle
// =============================================================================

#[test]
fn test_enable_then_disable_is_idle_manual_with_no_dispatch() {
    let mut rig = Rig::new();
    rig.misaligned();

    rig.command(ControlCommand::Enable);
    rig.command(ControlCommand::Disable);

    let state = rig.runtime.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.reason, Some(ReasonCode::Manual));
    assert!(!state.active);

    rig.run_for(30_000);
    assert!(rig.actuator.is_empty());
}

#[test]
fn test_enable_then_disable_under_soft_conditions_dispatches_nothing() {
    // Target only: no reference yet
    let mut rig = Rig::new();
    rig.record("excel", 1.8, 2.0, false);
    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::NoReference));
    rig.command(ControlCommand::Disable);
    rig.run_for(30_000);
    assert!(rig.actuator.is_empty());

    // Spread spike from a second book
    let mut rig = Rig::new();
    rig.aligned();
    rig.record("book-b", 10.0, 10.0, false);
    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::SpreadSpike));
    rig.command(ControlCommand::Disable);
    rig.run_for(30_000);
    assert!(rig.actuator.is_empty());
}

#[test]
fn test_hard_block_during_soft_suspension_is_not_auto_resumed() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);
    rig.record("book-b", 10.0, 10.0, false);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::SpreadSpike));

    rig.command(ControlCommand::ProcessHealth(ProcessHealth {
        running: Some(false),
        ..Default::default()
    }));
    let state = rig.runtime.state();
    assert_eq!(state.reason, Some(ReasonCode::ProcessOff));
    assert!(!state.user_wanted);
    assert!(state.status.starts_with("Blocked"));

    rig.remove("book-b");
    rig.run_for(5_000);
    rig.command(ControlCommand::ProcessHealth(ProcessHealth {
        running: Some(true),
        ..Default::default()
    }));
    rig.run_for(5_000);

    let state = rig.runtime.state();
    assert!(!state.active);
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.reason, Some(ReasonCode::ProcessOff));
}

#[test]
fn test_hard_block_wins_over_soft_conditions() {
    let mut rig = Rig::new();
    // Frozen target, no reference and a spread spike all at once
    rig.record("excel", 1.8, 2.0, true);
    rig.command(ControlCommand::ProcessHealth(ProcessHealth {
        running: Some(false),
        ..Default::default()
    }));

    rig.command(ControlCommand::Enable);
    let state = rig.runtime.state();
    assert!(!state.active);
    assert_eq!(state.reason, Some(ReasonCode::ProcessOff));

    rig.command(ControlCommand::ProcessHealth(ProcessHealth {
        running: Some(true),
        ..Default::default()
    }));
    rig.command(ControlCommand::ExpectedIndex(Some(2)));
    rig.command(ControlCommand::ObservedIndex(Some(4)));
    rig.record("book-a", 10.0, 10.0, false);

    rig.command(ControlCommand::Enable);
    let state = rig.runtime.state();
    assert!(!state.active);
    assert_eq!(state.reason, Some(ReasonCode::IndexMismatch));
    assert!(rig.actuator.is_empty());
}

#[test]
fn test_observed_index_zero_counts_as_first() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::ExpectedIndex(Some(1)));
    rig.command(ControlCommand::ObservedIndex(Some(0)));

    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().phase, Phase::Trading);
}

#[test]
fn test_burst_then_alignment_then_trading() {
    let mut rig = Rig::new();
    rig.misaligned();
    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().phase, Phase::Aligning);

    rig.run_for(1_100);
    assert_eq!(
        rig.actuator.keys(),
        vec![Key::F24, Key::F24, Key::F24, Key::F22]
    );

    // Target catches up before the next alignment check
    rig.record("excel", 2.0, 3.0, false);
    rig.run_for(1_000);

    let state = rig.runtime.state();
    assert_eq!(state.phase, Phase::Trading);
    assert_eq!(state.reason, None);
    assert_eq!(state.status, "Trading");
    assert_eq!(rig.actuator.len(), 4);
}

#[test]
fn test_operator_freeze_suspends_and_unfreeze_resumes() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().phase, Phase::Trading);

    rig.record("excel", 1.8, 2.0, true);
    let state = rig.runtime.state();
    assert_eq!(state.phase, Phase::Idle);
    assert!(!state.active);
    assert!(state.user_wanted);
    assert!(state.user_suspended);
    assert_eq!(state.reason, Some(ReasonCode::PrimarySuspended));

    // Operator resumes after the cooldown, target has drifted meanwhile
    rig.clock.advance(3_000);
    rig.record("excel", 1.5, 2.0, false);
    let state = rig.runtime.state();
    assert!(state.active);
    assert_eq!(state.phase, Phase::Aligning);
    assert!(!state.user_suspended);

    // Operator-initiated pauses never produce signal keys
    rig.run_for(5_000);
    assert!(rig.signal_kinds().is_empty());
}

#[test]
fn test_resume_waits_for_cooldown_without_new_data() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);

    rig.record("excel", 1.8, 2.0, true);
    rig.record("excel", 1.8, 2.0, false);
    assert!(!rig.runtime.state().active);

    rig.run_for(2_999);
    assert!(!rig.runtime.state().active);
    rig.run_for(1);
    assert!(rig.runtime.state().active);
    assert_eq!(rig.runtime.state().phase, Phase::Trading);
}

#[test]
fn test_alignment_timeout_goes_idle_but_keeps_user_intent() {
    let mut rig = Rig::new();
    rig.misaligned();
    rig.command(ControlCommand::Enable);

    rig.run_for(20_000);

    let state = rig.runtime.state();
    assert!(!state.active);
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.reason, Some(ReasonCode::AlignFailed));
    assert!(state.user_wanted);
    assert!(state.status.starts_with("Align failed"));
}

#[test]
fn test_alignment_attempt_limit() {
    let mut config = AppConfig::default();
    config.control.max_alignment_attempts = 2;
    let mut rig = Rig::with_config(config);
    rig.misaligned();
    rig.command(ControlCommand::Enable);

    rig.run_for(1_500);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::AlignFailed));
}

#[test]
fn test_suspend_cancels_rest_of_burst() {
    let mut rig = Rig::new();
    rig.misaligned();
    rig.command(ControlCommand::Enable);
    rig.run_for(600);
    assert_eq!(rig.actuator.keys(), vec![Key::F24, Key::F24]);

    rig.record("book-b", 10.0, 10.0, false);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::SpreadSpike));
    rig.run_for(2_000);

    let pulses = rig
        .actuator
        .keys()
        .into_iter()
        .filter(|k| *k != Key::SIGNAL)
        .count();
    assert_eq!(pulses, 2);
}

#[test]
fn test_reenable_does_not_revive_stale_burst() {
    let mut rig = Rig::new();
    rig.misaligned();
    rig.command(ControlCommand::Enable);
    rig.command(ControlCommand::Disable);
    rig.command(ControlCommand::Enable);

    rig.run_for(1_100);
    assert_eq!(
        rig.actuator.keys(),
        vec![Key::F24, Key::F24, Key::F24, Key::F22]
    );
    assert_eq!(rig.runtime.state().epoch, 3);
}

#[test]
fn test_spike_signal_is_retried_once_when_ignored() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);

    rig.record("book-b", 10.0, 10.0, false);
    rig.run_for(599);
    assert_eq!(rig.signal_kinds(), vec![(SignalKind::Suspend, false)]);
    rig.run_for(1);
    assert_eq!(
        rig.signal_kinds(),
        vec![(SignalKind::Suspend, false), (SignalKind::Suspend, true)]
    );
    rig.run_for(5_000);
    assert_eq!(rig.signal_kinds().len(), 2);
}

#[test]
fn test_spike_round_trip_sends_resume_key() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);
    let mut signals = rig.runtime.signals();

    rig.record("book-b", 10.0, 10.0, false);
    // Downstream honours the suspend key
    rig.record("excel", 1.8, 2.0, true);
    rig.remove("book-b");
    rig.run_for(3_500);

    let state = rig.runtime.state();
    assert!(state.active);
    assert_eq!(state.phase, Phase::Trading);
    assert_eq!(
        rig.signal_kinds(),
        vec![(SignalKind::Suspend, false), (SignalKind::Resume, false)]
    );

    let suspend = signals.try_recv().unwrap();
    assert_eq!(suspend.kind, SignalKind::Suspend);
    assert_eq!(suspend.reason, Some(ReasonCode::SpreadSpike));
    let resume = signals.try_recv().unwrap();
    assert_eq!(resume.kind, SignalKind::Resume);
    assert_eq!(resume.reason, Some(ReasonCode::SpreadSpike));
}

#[test]
fn test_mode_switch_disables_first() {
    let mut rig = Rig::new();
    rig.aligned();
    rig.command(ControlCommand::Enable);

    rig.command(ControlCommand::SetMode(Mode::Service));
    let state = rig.runtime.state();
    assert!(!state.active);
    assert!(!state.user_wanted);
    assert_eq!(state.mode, Mode::Service);

    rig.command(ControlCommand::Connected(true));
    rig.record("ds", 1.8, 2.0, false);
    rig.command(ControlCommand::Enable);
    assert_eq!(rig.runtime.state().phase, Phase::Trading);
}

#[test]
fn test_config_updates_are_clamped() {
    let mut rig = Rig::new();
    rig.command(ControlCommand::SetConfig(ConfigUpdate {
        max_pulses: Some(0),
        shock_threshold_pct: Some(500.0),
        suspend_threshold_pct: Some(250.0),
        ..Default::default()
    }));
    let config = rig.runtime.state().config;
    assert_eq!(config.max_pulses, 1);
    assert_eq!(config.shock_threshold_pct, 100.0);
    assert!(config.suspend_threshold_pct <= config.shock_threshold_pct);
}

#[test]
fn test_state_feed_pushes_current_and_future_states() {
    let mut rig = Rig::new();
    let mut feed = rig.runtime.subscribe_state();
    assert_eq!(feed.borrow_and_update().phase, Phase::Idle);

    rig.aligned();
    rig.command(ControlCommand::Enable);
    assert!(feed.has_changed().unwrap());
    assert_eq!(feed.borrow_and_update().phase, Phase::Trading);

    rig.command(ControlCommand::Disable);
    assert_eq!(feed.borrow_and_update().reason, Some(ReasonCode::Manual));
}

#[test]
fn test_wire_events_drive_a_full_cycle() {
    let mut rig = Rig::new();
    rig.wire(r#"{"type":"record","source_id":"book-a","sides":[2.0,3.0]}"#);
    rig.wire(r#"{"type":"record","source_id":"excel","sides":["1.36","3.0"]}"#);
    rig.wire(r#"{"type":"set_config","config":{"pulse_gap_ms":100}}"#);
    rig.wire(r#"{"type":"toggle"}"#);

    rig.run_for(300);
    assert_eq!(
        rig.actuator.keys(),
        vec![Key::F24, Key::F24, Key::F24, Key::F22]
    );

    rig.wire(r#"{"type":"disable"}"#);
    assert_eq!(rig.runtime.state().reason, Some(ReasonCode::Manual));
}

#[test]
fn test_swapped_source_keeps_reference_in_market_order() {
    let mut rig = Rig::new();
    rig.record("book-a", 1.8, 2.2, false);
    // Lists the second outcome first
    rig.record("book-b", 2.2, 1.8, false);
    rig.record("excel", 1.8, 2.2, false);
    let reference = rig.runtime.snapshot().derived.reference.unwrap();
    assert!((reference[0] - 2.0).abs() < 1e-9);

    rig.wire(r#"{"type":"swapped_sources","source_ids":["book-b"]}"#);
    let reference = rig.runtime.snapshot().derived.reference.unwrap();
    assert!((reference[0] - 1.8).abs() < 1e-9);
    assert!((reference[1] - 2.2).abs() < 1e-9);

    rig.command(ControlCommand::Enable);
    let state = rig.runtime.state();
    assert_eq!(state.phase, Phase::Trading);
    assert!(rig.actuator.is_empty());
}
