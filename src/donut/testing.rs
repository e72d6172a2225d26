//! Scripted HTTP adapter for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

use super::http::{HttpGet, HttpResponse};
use crate::error::TransportError;
use crate::models::Endpoint;

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(TransportError),
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Reply::Status(status, body.to_string())
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Reply::Status(status, body.to_string())
    }

    pub fn connect_error() -> Self {
        Reply::Fail(TransportError::Connect("connection refused".to_string()))
    }
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct FakeHttp {
    replies: Mutex<HashMap<Endpoint, Reply>>,
    delay: Mutex<Duration>,
    counters: HashMap<Endpoint, Arc<Counters>>,
    last_headers: Mutex<Option<HeaderMap>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        let counters = [Endpoint::Stats, Endpoint::Lookup]
            .into_iter()
            .map(|e| (e, Arc::new(Counters::default())))
            .collect();

        Self {
            replies: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            counters,
            last_headers: Mutex::new(None),
        }
    }

    pub fn reply(self, endpoint: Endpoint, reply: Reply) -> Self {
        self.set_reply(endpoint, reply);
        self
    }

    pub fn set_reply(&self, endpoint: Endpoint, reply: Reply) {
        self.replies.lock().unwrap().insert(endpoint, reply);
    }

    /// Every request sleeps this long before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.counters[&endpoint].calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self, endpoint: Endpoint) -> usize {
        self.counters[&endpoint].in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self, endpoint: Endpoint) -> usize {
        self.counters[&endpoint].max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.last_headers.lock().unwrap().clone()
    }
}

/// Decrements the in-flight counter even when the request future is dropped
struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: Arc<Counters>) -> Self {
        counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn endpoint_of(url: &Url) -> Endpoint {
    if url.path().contains("/lookup/") {
        Endpoint::Lookup
    } else {
        Endpoint::Stats
    }
}

#[async_trait]
impl HttpGet for FakeHttp {
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let endpoint = endpoint_of(url);
        let _guard = InFlight::enter(self.counters[&endpoint].clone());
        *self.last_headers.lock().unwrap() = Some(headers.clone());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| Reply::raw(404, ""));

        match reply {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                body: body.into_bytes(),
            }),
            Reply::Fail(e) => Err(e),
        }
    }
}
