//! HTTP Transport
//!
//! One request/response pair per call, plus the classification the bounded
//! retry loop is driven by.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Body phrases that turn a 403 into a throttling response
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "abuse detection"];

/// Methods the Git Data API needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Overrides the client-wide timeout for this request
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Serialize `payload` as the body and set `Content-Type`
    pub fn json<T: Serialize>(self, payload: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(payload).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        Ok(self
            .header("Content-Type", "application/json")
            .body(Bytes::from(encoded)))
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find_map(|(key, value)| key.eq_ignore_ascii_case(name).then_some(value.as_str()))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429, or a 403 whose body says the caller was throttled
    pub fn is_rate_limited(&self) -> bool {
        match self.status {
            429 => true,
            403 => {
                let body = String::from_utf8_lossy(&self.body).to_ascii_lowercase();
                RATE_LIMIT_MARKERS.iter().any(|marker| body.contains(marker))
            }
            _ => false,
        }
    }

    pub fn classify(&self) -> ResponseClass {
        match self.status {
            304 => ResponseClass::Success,
            _ if self.is_success() => ResponseClass::Success,
            500..=599 => ResponseClass::Retriable,
            _ if self.is_rate_limited() => ResponseClass::Retriable,
            _ => ResponseClass::Final,
        }
    }
}

/// How the retry loop treats a response that did arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx or 304
    Success,
    /// 429, 5xx, or a throttling 403
    Retriable,
    /// Every other status; handed back to the caller untouched
    Final,
}

/// Bounded exponential backoff: `base_delay * 2^(attempt-1)`, capped at
/// `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Sleep after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP transport provided by the host
///
/// One attempt per call. Retrying is layered on top by the caller, driven by
/// [`HttpResponse::classify`], [`NetworkErrorKind::is_retriable`] and a
/// [`RetryPolicy`].
///
/// [`NetworkErrorKind::is_retriable`]: crate::error::NetworkErrorKind::is_retriable
///
/// ```ignore
/// let request = HttpRequest::new(HttpMethod::Get, "https://api.github.com/rate_limit")
///     .header("Accept", "application/vnd.github+json");
/// let remaining = client.execute(request).await?.header("x-ratelimit-remaining");
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Single attempt. Fails with [`BridgeError::Network`] only when no
    /// response arrived at all.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}
