//! API module - HTTP handlers and routes

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};

use crate::poller::PollManager;

/// Shared state of the status API
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<PollManager>,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(manager: Arc<PollManager>) -> Self {
        Self {
            manager,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Setup step
        .route("/api/validate", post(handlers::validate_credentials))
        // Targets
        .route(
            "/api/targets",
            get(handlers::list_targets).post(handlers::create_target),
        )
        .route(
            "/api/targets/:username",
            get(handlers::get_target).delete(handlers::delete_target),
        )
        .route("/api/targets/:username/stats", get(handlers::get_target_stats))
        .route("/api/targets/:username/refresh", post(handlers::refresh_target))
        .route("/api/targets/:username/restart", post(handlers::restart_target))
}
