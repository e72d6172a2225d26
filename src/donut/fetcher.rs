//! Stats fetch and merge
//!
//! Stats and lookup are requested concurrently. Either may fail without
//! aborting the other; the cycle only fails when both do.

use serde_json::{Map, Value};

use super::client::DonutClient;
use super::http::HttpResponse;
use crate::models::{
    Credentials, Endpoint, FailureKind, FetchOutcome, StatsSnapshot, SubFetchFailure,
};

/// Application-level status of a good envelope
const ENVELOPE_OK: i64 = 200;

type SubFetch = Result<Map<String, Value>, SubFetchFailure>;

impl DonutClient {
    pub async fn fetch(&self, credentials: &Credentials) -> FetchOutcome {
        let (stats, lookup) = futures::join!(
            self.fetch_one(Endpoint::Stats, credentials),
            self.fetch_one(Endpoint::Lookup, credentials),
        );

        let outcome = merge(stats, lookup);
        match &outcome {
            FetchOutcome::Snapshot { snapshot, failed } => {
                tracing::debug!(
                    "[Fetcher] {}: {} fields, {} endpoint(s) failed",
                    credentials.username(),
                    snapshot.len(),
                    failed.len()
                );
            }
            FetchOutcome::Failure { message, .. } => {
                tracing::warn!("[Fetcher] {}: update failed: {}", credentials.username(), message);
            }
        }
        outcome
    }

    async fn fetch_one(&self, endpoint: Endpoint, credentials: &Credentials) -> SubFetch {
        let result = match self.request(endpoint, credentials).await {
            Ok(response) => parse_envelope(endpoint, &response),
            Err(e) => Err(SubFetchFailure {
                endpoint,
                kind: FailureKind::Transport,
                message: e.to_string(),
            }),
        };

        if let Err(failure) = &result {
            tracing::warn!(
                "[Fetcher] Failed to fetch {} for {}: {}",
                endpoint,
                credentials.username(),
                failure
            );
        }
        result
    }
}

/// `{"status": 200, "result": {...}}` with a 2xx HTTP status
fn parse_envelope(endpoint: Endpoint, response: &HttpResponse) -> SubFetch {
    let fail = |kind, message: String| SubFetchFailure {
        endpoint,
        kind,
        message,
    };

    match response.status {
        401 => return Err(fail(FailureKind::Unauthorized, "HTTP 401".to_string())),
        404 => return Err(fail(FailureKind::NotFound, "HTTP 404".to_string())),
        s if !response.is_success() => {
            return Err(fail(FailureKind::Transport, format!("HTTP {}", s)))
        }
        _ => {}
    }

    let body: Value = serde_json::from_slice(&response.body)
        .map_err(|e| fail(FailureKind::Malformed, format!("invalid JSON: {}", e)))?;

    let status = body
        .get("status")
        .and_then(Value::as_i64)
        .ok_or_else(|| fail(FailureKind::Malformed, "missing status field".to_string()))?;

    if status != ENVELOPE_OK {
        let reason = body
            .get("message")
            .or_else(|| body.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        return Err(fail(
            FailureKind::Application,
            format!("status {}: {}", status, reason),
        ));
    }

    match body.get("result") {
        Some(Value::Object(result)) => Ok(result.clone()),
        _ => Err(fail(FailureKind::Malformed, "missing result object".to_string())),
    }
}

/// Stats fields first; lookup never overwrites a stats key.
fn merge(stats: SubFetch, lookup: SubFetch) -> FetchOutcome {
    let mut snapshot = StatsSnapshot::new();
    let mut failed = Vec::new();

    for sub in [stats, lookup] {
        let fields = match sub {
            Ok(fields) => fields,
            Err(failure) => {
                failed.push(failure);
                continue;
            }
        };

        for (key, value) in fields {
            if !is_scalar(&value) {
                tracing::debug!("[Fetcher] Skipping non-scalar field {}", key);
                continue;
            }
            if snapshot.contains_key(&key) {
                tracing::debug!("[Fetcher] Keeping stats value for duplicate field {}", key);
                continue;
            }
            snapshot.insert(key, value);
        }
    }

    if failed.len() == 2 {
        let message = failed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return FetchOutcome::Failure {
            kind: failed[0].kind,
            message,
        };
    }

    FetchOutcome::Snapshot { snapshot, failed }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
