//! Activity accrual: turning heartbeats into logged working hours.

pub mod accrual;
pub mod display;
mod engine;

pub use accrual::{Accrual, AccrualPolicy, SkipReason};
pub use engine::{ActivityTracker, HeartbeatReport};
