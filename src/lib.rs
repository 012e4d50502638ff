//! Odds alignment controller
//!
//! Keeps a target's displayed odds within tolerance of a reference derived
//! from live sources:
//! - ValueStore: latest record per source plus derived reference values
//! - Guards: ordered safety preconditions, hard blocks vs soft suspensions
//! - Alignment engine: pulse decisions with per-side cooldown
//! - Coordinator: Idle / Aligning / Trading state machine

pub mod config;
pub mod core;
pub mod error;

pub use error::{ActuatorError, AppError};
