//! Shared HTTP transport
//!
//! One `reqwest::Client` per API client instance, configured with a request
//! timeout and an optional proxy. Rate-limited (429) responses to idempotent
//! requests are retried with exponential backoff up to `max_retries` times,
//! honoring a numeric `Retry-After` header (up to one minute) when present.
//! Every other non-2xx response is classified into an `Error`:
//!
//! - 401 → `Authentication`, message from the body's `error_description`
//! - anything else → `Api`, carrying the parsed JSON body (or the raw text)
//! - timeouts and transport failures → `Api` with the `reqwest::Error` attached

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Error, ErrorDetail, Result};
use crate::request::{ApiRequest, RequestBody};

/// Longest wait honored from a `Retry-After` header
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Transport settings. `backoff_factor` is the delay before the first retry;
/// each further retry doubles it.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: Duration,
    /// Proxy URL applied to every scheme (`http://`, `https://`, `socks5://`)
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(7),
            max_retries: 10,
            backoff_factor: Duration::from_millis(100),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff_factor: Duration,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            timeout: config.timeout,
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
        })
    }

    /// Send a request, returning the response only if its status is 2xx.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let response = self
                .build(request)
                .send()
                .await
                .map_err(|e| self.transport_error(e, request))?;

            let status = response.status();
            debug!(status = status.as_u16(), attempt, "received response");

            if status == StatusCode::TOO_MANY_REQUESTS
                && request.is_idempotent()
                && attempt < self.max_retries
            {
                let delay = self.retry_delay(response.headers(), attempt);
                attempt += 1;
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.is_success() {
                return Ok(response);
            }
            return Err(classify_failure(response, request).await);
        }
    }

    fn build(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        match &request.body {
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder,
        }
    }

    /// `Retry-After` seconds capped at [`MAX_RETRY_AFTER`], else backoff.
    fn retry_delay(&self, headers: &HeaderMap, attempt: u32) -> Duration {
        match retry_after(headers) {
            Some(delay) => delay.min(MAX_RETRY_AFTER),
            None => self.backoff(attempt),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    fn transport_error(&self, e: reqwest::Error, request: &ApiRequest) -> Error {
        let message = if e.is_timeout() {
            format!(
                "request timed out after {:?}, try increasing the client's timeout",
                self.timeout
            )
        } else {
            format!("request failed: {e}")
        };
        Error::Api(Box::new(
            ErrorDetail::new(message)
                .with_request(request.info())
                .with_source(e),
        ))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn classify_failure(response: reqwest::Response, request: &ApiRequest) -> Error {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    // Resource errors: {"error": {"status", "message"}}
    // Accounts errors: {"error": "<code>", "error_description": "..."}
    let error = body.get("error");
    let resource_message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str);
    let code = error.and_then(Value::as_str);
    let description = body.get("error_description").and_then(Value::as_str);

    let detail = |message: String| {
        Box::new(
            ErrorDetail::new(message)
                .with_status(status)
                .with_body(body.clone())
                .with_request(request.info()),
        )
    };

    if status == StatusCode::UNAUTHORIZED.as_u16() {
        let message = description
            .or(resource_message)
            .or(code)
            .map(str::to_owned)
            .unwrap_or_else(|| body.to_string());
        Error::Authentication(detail(message))
    } else {
        let message = resource_message
            .or(description)
            .or(code)
            .map(str::to_owned)
            .unwrap_or_else(|| body.to_string());
        Error::Api(detail(message))
    }
}
