//! Data models for the Donut SMP poller

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ============================================================================
// Credentials
// ============================================================================

/// Placeholder some setups store instead of leaving the key empty
const API_KEY_PLACEHOLDER: &str = "none";

/// One polling target. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    api_key: Option<String>,
}

impl Credentials {
    /// Trims the username (must be non-empty and usable as one URL path
    /// segment) and drops an empty or placeholder API key, so it can never
    /// be sent.
    pub fn new(username: &str, api_key: Option<&str>) -> Result<Self, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::BadRequest("username must not be empty".to_string()));
        }
        // URL normalization would turn these into "current/parent directory"
        if username == "." || username == ".." {
            return Err(AppError::BadRequest(format!("invalid username: {}", username)));
        }

        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case(API_KEY_PLACEHOLDER))
            .map(String::from);

        Ok(Self {
            username: username.to_string(),
            api_key,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

// API keys stay out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &self.api_key.as_ref().map(|_| "********"))
            .finish()
    }
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationResult {
    Valid { uuid: String },
    NotFound,
    Unauthorized,
    MalformedResponse,
    TransportError { detail: String },
}

impl ValidationResult {
    /// Key shown by the setup form. `None` for `Valid`.
    pub fn error_key(&self) -> Option<&'static str> {
        match self {
            ValidationResult::Valid { .. } => None,
            ValidationResult::NotFound => Some("user_not_found"),
            ValidationResult::Unauthorized => Some("invalid_api_key"),
            ValidationResult::MalformedResponse => Some("malformed_response"),
            ValidationResult::TransportError { .. } => Some("cannot_connect"),
        }
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Flat field map merged from the stats and lookup `result` objects.
/// Values are JSON scalars only.
pub type StatsSnapshot = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Stats,
    Lookup,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Stats => "stats",
            Endpoint::Lookup => "lookup",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, DNS, timeout or an unexpected HTTP status
    Transport,
    Unauthorized,
    NotFound,
    /// Body is not the documented JSON envelope
    Malformed,
    /// Envelope parsed but its own `status` is not 200
    Application,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::NotFound => "not_found",
            FailureKind::Malformed => "malformed",
            FailureKind::Application => "application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFetchFailure {
    pub endpoint: Endpoint,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for SubFetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.endpoint, self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// At least one endpoint answered. `failed` lists the ones that did not.
    Snapshot {
        snapshot: StatsSnapshot,
        failed: Vec<SubFetchFailure>,
    },
    Failure { kind: FailureKind, message: String },
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        matches!(self, FetchOutcome::Snapshot { failed, .. } if !failed.is_empty())
    }
}

// ============================================================================
// Polling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    Failed,
    Stopped,
}

/// Per-target state, written only by that target's poll loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollState {
    pub phase: PollPhase,
    pub last_snapshot: StatsSnapshot,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Endpoints missing from `last_snapshot`
    pub failed_endpoints: Vec<Endpoint>,
    pub cycles: u64,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl PollState {
    pub fn new(interval: Duration) -> Self {
        Self {
            phase: PollPhase::Idle,
            last_snapshot: StatsSnapshot::new(),
            last_error: None,
            last_success_at: None,
            last_attempt_at: None,
            failed_endpoints: Vec::new(),
            cycles: 0,
            interval,
        }
    }

    /// Apply one finished cycle. A failure never clears the last snapshot.
    pub fn apply(&mut self, outcome: FetchOutcome, at: DateTime<Utc>) {
        self.cycles += 1;
        self.last_attempt_at = Some(at);

        match outcome {
            FetchOutcome::Snapshot { snapshot, failed } => {
                self.last_snapshot = snapshot;
                self.failed_endpoints = failed.iter().map(|f| f.endpoint).collect();
                self.last_error = None;
                self.last_success_at = Some(at);
                self.phase = PollPhase::Idle;
            }
            FetchOutcome::Failure { kind, message } => {
                self.last_error = Some(format!("Update failed ({}): {}", kind.as_str(), message));
                self.phase = PollPhase::Failed;
            }
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
