//! Polling module
//!
//! - `scheduler`: per-target poll loop (fixed interval, no overlap, clean stop)
//! - `manager`: target registration and lifecycle

pub mod manager;
pub mod scheduler;

pub use manager::{PollManager, TargetEntry, TargetStatus};
pub use scheduler::PollHandle;
