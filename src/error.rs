//! Application-wide error types using thiserror
//!
//! Guard-driven suspensions are NOT errors: they are represented as
//! `ReasonCode` values on the coordinator state. `AppError` covers the
//! genuinely unexpected cases (bad config, malformed records, IO).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure reported by an actuator implementation.
///
/// Dispatch is best-effort: the coordinator logs these at the boundary and
/// never lets them influence the state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("Actuator channel full")]
    ChannelFull,

    #[error("Actuator channel closed")]
    ChannelClosed,

    #[error("Actuator rejected command: {0}")]
    Rejected(String),
}
