//! Donut SMP API client
//!
//! Builds endpoint URLs and request headers. `validate` and `fetch` live in
//! `validator.rs` and `fetcher.rs`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use url::Url;

use super::http::{check_request, HttpGet, HttpResponse};
use crate::config::{ApiConfig, ApiKeyHeader};
use crate::error::{AppError, TransportError};
use crate::models::{Credentials, Endpoint};

pub struct DonutClient {
    http: Arc<dyn HttpGet>,
    base_url: Url,
    user_agent: String,
    api_key_header: ApiKeyHeader,
    timeout: Duration,
}

impl DonutClient {
    pub fn new(http: Arc<dyn HttpGet>, config: &ApiConfig) -> Result<Self, AppError> {
        if config.timeout_secs == 0 {
            return Err(AppError::Config("api.timeout_secs must be > 0".to_string()));
        }

        Ok(Self {
            http,
            base_url: config.base_url()?,
            user_agent: config.user_agent.clone(),
            api_key_header: config.api_key_header,
            timeout: config.timeout(),
        })
    }

    /// `<base>/<endpoint>/<username>`, username as a single encoded segment
    pub fn endpoint_url(&self, endpoint: Endpoint, username: &str) -> Result<Url, TransportError> {
        // `push` drops dot segments instead of encoding them
        if username.is_empty() || username == "." || username == ".." {
            return Err(TransportError::InvalidUrl(format!(
                "{}{}/{}",
                self.base_url,
                endpoint.as_str(),
                username
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(endpoint.as_str())
            .push(username);
        Ok(url)
    }

    pub fn headers(&self, credentials: &Credentials) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();

        let agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| TransportError::InvalidHeader("User-Agent".to_string()))?;
        headers.insert(USER_AGENT, agent);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = credentials.api_key() {
            let name = HeaderName::from_static(match self.api_key_header {
                ApiKeyHeader::XApiKey => "x-api-key",
                ApiKeyHeader::Authorization => "authorization",
            });
            let mut value = HeaderValue::from_str(key).map_err(|_| {
                TransportError::InvalidHeader(self.api_key_header.as_str().to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// One GET against `endpoint` for this target
    pub async fn request(
        &self,
        endpoint: Endpoint,
        credentials: &Credentials,
    ) -> Result<HttpResponse, TransportError> {
        let url = self.endpoint_url(endpoint, credentials.username())?;
        check_request(&url, self.timeout)?;
        let headers = self.headers(credentials)?;
        self.http.get(&url, &headers, self.timeout).await
    }
}
