//! Credential validation against the lookup endpoint

use serde_json::Value;

use super::client::DonutClient;
use super::http::HttpResponse;
use crate::models::{Credentials, Endpoint, ValidationResult};

impl DonutClient {
    /// Single lookup call, classified. Never retries.
    pub async fn validate(&self, credentials: &Credentials) -> ValidationResult {
        let username = credentials.username();

        let response = match self.request(Endpoint::Lookup, credentials).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("[Validator] Connection error for {}: {}", username, e);
                return ValidationResult::TransportError {
                    detail: e.to_string(),
                };
            }
        };

        let result = classify_lookup(&response);
        match &result {
            ValidationResult::Valid { uuid } => {
                tracing::info!("[Validator] {} resolved to {}", username, uuid);
            }
            ValidationResult::NotFound => {
                tracing::warn!("[Validator] User not found: {}", username);
            }
            ValidationResult::Unauthorized => {
                tracing::warn!("[Validator] API key rejected for {}", username);
            }
            ValidationResult::MalformedResponse => {
                tracing::error!(
                    "[Validator] Unexpected lookup body for {} (status {})",
                    username,
                    response.status
                );
            }
            ValidationResult::TransportError { detail } => {
                tracing::error!("[Validator] API error for {}: {}", username, detail);
            }
        }

        result
    }
}

/// 404 first, then 401, then any other non-2xx, then the body.
fn classify_lookup(response: &HttpResponse) -> ValidationResult {
    match response.status {
        404 => ValidationResult::NotFound,
        401 => ValidationResult::Unauthorized,
        _ if !response.is_success() => ValidationResult::TransportError {
            detail: format!("HTTP {}", response.status),
        },
        _ => match extract_uuid(&response.body) {
            Some(uuid) => ValidationResult::Valid { uuid },
            None => ValidationResult::MalformedResponse,
        },
    }
}

/// `uuid` at the top level, or inside the `result` envelope
fn extract_uuid(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let uuid = value
        .get("uuid")
        .or_else(|| value.get("result").and_then(|r| r.get("uuid")))?;

    uuid.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::ApiConfig;
    use crate::donut::testing::{FakeHttp, Reply};
    use crate::error::TransportError;

    fn client(http: FakeHttp) -> (DonutClient, Arc<FakeHttp>) {
        let http = Arc::new(http);
        let client = DonutClient::new(http.clone(), &ApiConfig::default()).unwrap();
        (client, http)
    }

    #[tokio::test]
    async fn test_valid_uuid() {
        let (client, _) = client(
            FakeHttp::new().reply(Endpoint::Lookup, Reply::json(200, json!({"uuid": "abc-123"}))),
        );
        let creds = Credentials::new("Steve", None).unwrap();

        assert_eq!(
            client.validate(&creds).await,
            ValidationResult::Valid {
                uuid: "abc-123".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_uuid_inside_result_envelope() {
        let (client, _) = client(FakeHttp::new().reply(
            Endpoint::Lookup,
            Reply::json(200, json!({"status": 200, "result": {"uuid": "u-9", "rank": "VIP"}})),
        ));
        let creds = Credentials::new("Steve", None).unwrap();

        assert_eq!(
            client.validate(&creds).await,
            ValidationResult::Valid {
                uuid: "u-9".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_not_found_regardless_of_key() {
        for key in [None, Some("none"), Some("real-key")] {
            let (client, _) = client(
                FakeHttp::new().reply(Endpoint::Lookup, Reply::json(404, json!({"uuid": "x"}))),
            );
            let creds = Credentials::new("Ghost", key).unwrap();
            assert_eq!(client.validate(&creds).await, ValidationResult::NotFound);
        }
    }

    #[tokio::test]
    async fn test_unauthorized() {
        for key in [None, Some("wrong")] {
            let (client, _) =
                client(FakeHttp::new().reply(Endpoint::Lookup, Reply::raw(401, "Unauthorized")));
            let creds = Credentials::new("Steve", key).unwrap();
            assert_eq!(client.validate(&creds).await, ValidationResult::Unauthorized);
        }
    }

    #[tokio::test]
    async fn test_other_status_is_transport_error() {
        let (client, _) = client(FakeHttp::new().reply(Endpoint::Lookup, Reply::raw(503, "")));
        let creds = Credentials::new("Steve", None).unwrap();

        assert_eq!(
            client.validate(&creds).await,
            ValidationResult::TransportError {
                detail: "HTTP 503".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_bodies() {
        for body in ["{}", "not json", "{\"uuid\": \"\"}", "{\"uuid\": 42}", "[]"] {
            let (client, _) =
                client(FakeHttp::new().reply(Endpoint::Lookup, Reply::raw(200, body)));
            let creds = Credentials::new("Steve", None).unwrap();
            assert_eq!(
                client.validate(&creds).await,
                ValidationResult::MalformedResponse,
                "body: {}",
                body
            );
        }
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let (client, _) = client(FakeHttp::new().reply(Endpoint::Lookup, Reply::connect_error()));
        let creds = Credentials::new("Steve", None).unwrap();

        let result = client.validate(&creds).await;
        assert_eq!(
            result,
            ValidationResult::TransportError {
                detail: TransportError::Connect("connection refused".to_string()).to_string()
            }
        );
        assert_eq!(result.error_key(), Some("cannot_connect"));
    }

    #[tokio::test]
    async fn test_api_key_header_sent_only_when_real() {
        let (client, http) =
            client(FakeHttp::new().reply(Endpoint::Lookup, Reply::json(200, json!({"uuid": "u"}))));

        let creds = Credentials::new("Steve", Some("NONE")).unwrap();
        client.validate(&creds).await;
        assert!(http.last_headers().unwrap().get("x-api-key").is_none());

        let creds = Credentials::new("Steve", Some("secret")).unwrap();
        client.validate(&creds).await;
        assert_eq!(http.last_headers().unwrap().get("x-api-key").unwrap(), "secret");
        assert_eq!(http.calls(Endpoint::Lookup), 2);
        assert_eq!(http.calls(Endpoint::Stats), 0);
    }
}
