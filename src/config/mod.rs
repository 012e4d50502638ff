//! Configuration module for controller settings and YAML loading
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `ControlConfig`, `GuardSettings`, `TargetIds`)
//! - Partial update payloads (`ConfigUpdate`, `GuardSettingsUpdate`)
//! - YAML loading functionality (`load_config`)
//! - Logging setup (`init_logging`)
//! - Defaults, clamp ranges and env-overridable knobs

pub mod constants;
mod loader;
pub mod logging;
mod types;

// Re-export types
pub use types::{
    AppConfig, ConfigUpdate, ControlConfig, GuardSettings, GuardSettingsUpdate, Mode, TargetIds,
};

// Re-export loader functions
pub use loader::{load_config, load_config_from_str, load_config_or_default};

pub use logging::init_logging;
