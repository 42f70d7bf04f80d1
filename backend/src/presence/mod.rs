//! Realtime presence: who is connected, and who counts as on duty.

mod registry;
pub mod ws;

pub use registry::PresenceRegistry;
