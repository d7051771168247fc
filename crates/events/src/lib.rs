//! Event system for the cellular echo runners
//!
//! This crate provides the event bus and event types used to report
//! connect attempts, phase transitions and transaction results to
//! whoever is printing status lines.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
