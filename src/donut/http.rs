//! HTTP adapter
//!
//! Thin GET wrapper: returns whatever status the server sent, or a
//! `TransportError` when no response was received. No retries. Callers
//! run `check_request` first.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use url::Url;

use crate::error::TransportError;

/// Raw response. 4xx/5xx are not errors here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Checks shared by every adapter: absolute https URL, positive timeout
pub fn check_request(url: &Url, timeout: Duration) -> Result<(), TransportError> {
    if url.scheme() != "https" || url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(TransportError::InvalidUrl(url.to_string()));
    }
    if timeout.is_zero() {
        return Err(TransportError::InvalidTimeout);
    }
    Ok(())
}

/// reqwest-backed adapter. One pooled client, shared by every target.
#[derive(Clone)]
pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TransportError::Request(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("[Http] GET {} failed: {}", url.path(), e);
                TransportError::from(e)
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(TransportError::from)?;

        tracing::debug!("[Http] GET {} -> {} ({} bytes)", url.path(), status, body.len());

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
