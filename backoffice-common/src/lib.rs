//! Back-office common types
//!
//! Shared types used by the backend and its clients.

pub mod hours;
pub mod presence;
pub mod role;
pub mod task;

pub use hours::{HoursSummary, TimeFilter};
pub use presence::{ClientMessage, PresenceRecord, ServerMessage};
pub use role::{Capability, Dashboard, Role, UnknownRole};
pub use task::{Task, TaskInput, TaskPriority, TaskStatus};
