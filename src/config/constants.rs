//! Control defaults, safe clamp ranges, and env-overridable runtime knobs
//!
//! Tunables that users change at runtime live in `ControlConfig`; the values
//! here are the defaults and the bounds every setter clamps into.

// =============================================================================
// Control Defaults
// =============================================================================

pub const DEFAULT_TOLERANCE_PCT: f64 = 1.5;
pub const DEFAULT_INTERVAL_MS: u64 = 200;
pub const DEFAULT_PULSE_STEP_PCT: f64 = 10.0;
pub const DEFAULT_PULSE_GAP_MS: u64 = 500;
pub const DEFAULT_MAX_PULSES: u32 = 3;
pub const DEFAULT_FIRE_COOLDOWN_MS: u64 = 900;
pub const DEFAULT_CONFIRM_DELAY_MS: u64 = 100;
pub const DEFAULT_SHOCK_THRESHOLD_PCT: f64 = 80.0;
/// Spread below which a spike suspension may resume
pub const DEFAULT_SUSPEND_THRESHOLD_PCT: f64 = 15.0;
pub const DEFAULT_ALIGNMENT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_ALIGNMENT_CHECK_INTERVAL_MS: u64 = 300;
pub const DEFAULT_MAX_ALIGNMENT_ATTEMPTS: u32 = 30;
pub const DEFAULT_SUSPEND_RETRY_DELAY_MS: u64 = 600;
pub const DEFAULT_RESUME_COOLDOWN_MS: u64 = 3_000;
pub const DEFAULT_RESUME_GRACE_MS: u64 = 2_000;

// =============================================================================
// Clamp Ranges (inclusive)
// =============================================================================

pub const TOLERANCE_PCT_RANGE: (f64, f64) = (1.0, 10.0);
pub const INTERVAL_MS_RANGE: (u64, u64) = (120, 10_000);
pub const PULSE_STEP_PCT_RANGE: (f64, f64) = (8.0, 15.0);
pub const PULSE_GAP_MS_RANGE: (u64, u64) = (50, 5_000);
pub const MAX_PULSES_RANGE: (u32, u32) = (1, 10);
pub const FIRE_COOLDOWN_MS_RANGE: (u64, u64) = (0, 10_000);
pub const CONFIRM_DELAY_MS_RANGE: (u64, u64) = (0, 2_000);
pub const SHOCK_THRESHOLD_PCT_RANGE: (f64, f64) = (1.0, 100.0);
pub const ALIGNMENT_TIMEOUT_MS_RANGE: (u64, u64) = (1_000, 120_000);
pub const ALIGNMENT_CHECK_INTERVAL_MS_RANGE: (u64, u64) = (100, 5_000);
pub const MAX_ALIGNMENT_ATTEMPTS_RANGE: (u32, u32) = (1, 500);
pub const SUSPEND_RETRY_DELAY_MS_RANGE: (u64, u64) = (100, 700);
pub const RESUME_COOLDOWN_MS_RANGE: (u64, u64) = (0, 60_000);
pub const RESUME_GRACE_MS_RANGE: (u64, u64) = (0, 10_000);

/// Alignment re-check waits at least this long past the fire cooldown
pub const ALIGNMENT_COOLDOWN_MARGIN_MS: u64 = 100;

/// Poll interval while waiting for the target to reflect the last burst
pub const TARGET_UPDATE_CHECK_INTERVAL_MS: u64 = 100;

// =============================================================================
// Runtime Knobs (env overrides)
// =============================================================================

/// Ingestion channel capacity (default: 256 events)
///
/// Environment variable: `INGEST_CHANNEL_CAPACITY`
pub fn ingest_channel_capacity() -> usize {
    std::env::var("INGEST_CHANNEL_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256)
}

/// Command channel capacity (default: 64 commands)
///
/// Environment variable: `COMMAND_CHANNEL_CAPACITY`
pub fn command_channel_capacity() -> usize {
    std::env::var("COMMAND_CHANNEL_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(64)
}

/// How long to wait for the target to change after a pulse burst (default: 3000ms)
///
/// Environment variable: `TARGET_UPDATE_TIMEOUT_MS`
pub fn target_update_timeout_ms() -> u64 {
    std::env::var("TARGET_UPDATE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3_000)
}

/// Print runtime knobs (for startup logs)
pub fn log_configuration() {
    tracing::info!("=== Runtime Knobs ===");
    tracing::info!("  - Ingest channel capacity: {}", ingest_channel_capacity());
    tracing::info!("  - Command channel capacity: {}", command_channel_capacity());
    tracing::info!("  - Target update timeout: {}ms", target_update_timeout_ms());
}
