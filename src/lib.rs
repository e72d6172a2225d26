//! Donut SMP poller
//!
//! Validates Donut SMP player credentials, polls the stats and lookup
//! endpoints on a fixed interval and keeps the merged result per player.
//! The status API in `api` is a thin consumer of `PollManager`.

pub mod api;
pub mod config;
pub mod donut;
pub mod error;
pub mod models;
pub mod poller;

pub use donut::{DonutClient, HttpGet, ReqwestHttp};
pub use error::{AppError, TransportError};
pub use models::{Credentials, FetchOutcome, PollState, StatsSnapshot, ValidationResult};
pub use poller::{PollHandle, PollManager};
