//! PollManager: multi-target lifecycle management
//!
//! Registers targets (validate first, then start polling), and owns one
//! PollHandle per target. A target's PollState lives exactly as long as
//! its registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::donut::DonutClient;
use crate::error::AppError;
use crate::models::{Credentials, PollState, ValidationResult};
use crate::poller::scheduler::PollHandle;

/// Metadata of a registered target
#[derive(Debug, Clone, Serialize)]
pub struct TargetEntry {
    pub title: String,
    pub username: String,
    /// Player uuid from the lookup endpoint
    pub unique_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    #[serde(flatten)]
    pub entry: TargetEntry,
    pub state: PollState,
}

struct Target {
    entry: TargetEntry,
    handle: PollHandle,
}

impl Target {
    fn status(&self) -> TargetStatus {
        TargetStatus {
            entry: self.entry.clone(),
            state: self.handle.state(),
        }
    }
}

pub struct PollManager {
    client: Arc<DonutClient>,
    interval: Duration,
    /// lowercase username → target
    targets: RwLock<HashMap<String, Target>>,
}

fn target_key(username: &str) -> String {
    username.trim().to_lowercase()
}

impl PollManager {
    pub fn new(client: Arc<DonutClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            targets: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<DonutClient> {
        &self.client
    }

    /// Register a new target
    /// 1. Reject a username that is already registered
    /// 2. Validate credentials against the lookup endpoint
    /// 3. Reject a uuid that is already registered
    /// 4. Start polling
    pub async fn register(&self, credentials: Credentials) -> Result<TargetEntry, AppError> {
        let key = target_key(credentials.username());

        if self.targets.read().await.contains_key(&key) {
            return Err(AppError::Conflict("already_configured".to_string()));
        }

        let uuid = match self.client.validate(&credentials).await {
            ValidationResult::Valid { uuid } => uuid,
            ValidationResult::TransportError { detail } => {
                return Err(AppError::BadGateway(format!("cannot_connect: {}", detail)));
            }
            other => {
                let error_key = other.error_key().unwrap_or("unknown");
                return Err(AppError::BadRequest(error_key.to_string()));
            }
        };

        // Re-check under the write lock; validation awaited without it
        let mut targets = self.targets.write().await;
        if targets.contains_key(&key) || targets.values().any(|t| t.entry.unique_id == uuid) {
            tracing::info!(
                "[PollManager] {} ({}) is already configured",
                credentials.username(),
                uuid
            );
            return Err(AppError::Conflict("already_configured".to_string()));
        }

        let entry = TargetEntry {
            title: format!("Donut SMP: {}", credentials.username()),
            username: credentials.username().to_string(),
            unique_id: uuid,
            created_at: Utc::now(),
        };

        let handle = PollHandle::spawn(self.client.clone(), credentials, self.interval);
        targets.insert(
            key,
            Target {
                entry: entry.clone(),
                handle,
            },
        );

        tracing::info!(
            "[PollManager] Registered target: {} ({})",
            entry.username,
            entry.unique_id
        );

        Ok(entry)
    }

    /// Stop polling and drop the target's state
    pub async fn remove(&self, username: &str) -> Result<(), AppError> {
        let target = self
            .targets
            .write()
            .await
            .remove(&target_key(username))
            .ok_or_else(|| AppError::NotFound(format!("Target {} not found", username)))?;

        target.handle.stop().await;
        tracing::info!("[PollManager] Removed target: {}", target.entry.username);
        Ok(())
    }

    pub async fn get(&self, username: &str) -> Option<TargetStatus> {
        self.targets
            .read()
            .await
            .get(&target_key(username))
            .map(Target::status)
    }

    pub async fn list(&self) -> Vec<TargetStatus> {
        let mut list: Vec<_> = self.targets.read().await.values().map(Target::status).collect();
        list.sort_by(|a, b| a.entry.username.cmp(&b.entry.username));
        list
    }

    pub async fn subscribe(&self, username: &str) -> Option<watch::Receiver<PollState>> {
        self.targets
            .read()
            .await
            .get(&target_key(username))
            .map(|t| t.handle.subscribe())
    }

    /// Manual refresh trigger for a specific target
    pub async fn refresh(&self, username: &str) -> Result<(), AppError> {
        let targets = self.targets.read().await;
        let target = targets
            .get(&target_key(username))
            .ok_or_else(|| AppError::NotFound(format!("Target {} not found", username)))?;

        target.handle.request_refresh();
        Ok(())
    }

    /// Restart the target's poll loop. The last snapshot and existing
    /// subscribers are kept; the first new cycle is immediate.
    pub async fn restart(&self, username: &str) -> Result<(), AppError> {
        let targets = self.targets.read().await;
        let target = targets
            .get(&target_key(username))
            .ok_or_else(|| AppError::NotFound(format!("Target {} not found", username)))?;

        target.handle.restart().await;

        tracing::info!("[PollManager] Restarted target: {}", target.entry.username);
        Ok(())
    }

    pub async fn target_count(&self) -> usize {
        self.targets.read().await.len()
    }

    /// Stop every poll loop
    pub async fn shutdown(&self) {
        let targets: Vec<Target> = self.targets.write().await.drain().map(|(_, t)| t).collect();
        let count = targets.len();

        futures::future::join_all(targets.iter().map(|t| t.handle.stop())).await;
        tracing::info!("[PollManager] Stopped {} targets", count);
    }
}
