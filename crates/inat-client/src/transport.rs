//! Transport boundary: live HTTP and dry-run
//!
//! Everything above this module behaves identically whether a request is
//! really sent or diverted to [`DryRunTransport`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{InatError, Result, TransportFailure};
use crate::request::{Method, WireRequest};

/// Status and body of an HTTP response, before any interpretation
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header (seconds form only)
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// A 200 response carrying `body` as JSON
    pub fn json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends wire requests. Implementations must be shareable across tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<RawResponse>;
}

/// When requests are diverted to the dry-run transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DryRunMode {
    /// Every request is sent
    #[default]
    Off,
    /// No request is sent
    All,
    /// Only write requests (POST, PUT, PATCH, DELETE) are diverted
    WriteOnly,
}

impl DryRunMode {
    pub fn diverts(&self, method: Method) -> bool {
        match self {
            Self::Off => false,
            Self::All => true,
            Self::WriteOnly => method.is_write(),
        }
    }
}

/// Live transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| InatError::from_reqwest("client", e))?;
        Ok(Self { http })
    }

    /// Use a preconfigured reqwest client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// `Retry-After` in its delay-seconds form; HTTP dates are ignored
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<RawResponse> {
        let url = request.full_url();
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.http.request(to_reqwest_method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InatError::from_reqwest(&url, e))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response
            .text()
            .await
            .map_err(|e| InatError::from_reqwest(&url, e))?;

        debug!(url = %url, status, bytes = body.len(), "Received response");
        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Body returned when no canned response is queued
pub fn default_dry_run_body() -> Value {
    json!({ "results": [], "total_results": 0 })
}

/// Records requests instead of sending them, and replays queued responses
#[derive(Debug, Default)]
pub struct DryRunTransport {
    requests: Mutex<Vec<WireRequest>>,
    queued: Mutex<VecDeque<Result<RawResponse>>>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a canned response for the next unanswered request
    pub fn push_response(&self, response: RawResponse) {
        Self::lock(&self.queued).push_back(Ok(response));
    }

    /// Queue a JSON body with status 200
    pub fn push_json(&self, body: Value) {
        self.push_response(RawResponse::json(&body));
    }

    /// Queue a transport failure for the next unanswered request
    pub fn push_failure(&self, failure: TransportFailure, message: impl Into<String>) {
        Self::lock(&self.queued).push_back(Err(InatError::transport(
            "dry-run",
            failure,
            message,
        )));
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<WireRequest> {
        Self::lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        Self::lock(&self.requests).len()
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, request: &WireRequest) -> Result<RawResponse> {
        let url = request.full_url();
        info!(method = %request.method, url = %url, "Dry-run request; not sending");
        Self::lock(&self.requests).push(request.clone());

        let queued = Self::lock(&self.queued).pop_front();
        match queued {
            Some(Err(InatError::Transport {
                failure,
                message,
                source,
                ..
            })) => Err(InatError::Transport {
                endpoint: url,
                failure,
                message,
                source,
            }),
            Some(result) => result,
            None => Ok(RawResponse::json(&default_dry_run_body())),
        }
    }
}
