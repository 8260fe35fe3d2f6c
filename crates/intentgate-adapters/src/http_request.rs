//! Generic HTTP request capability.
//!
//! Sends one request and returns status, body and elapsed time.  A non-2xx
//! answer is reported as [`AdapterError::Provider`] with the HTTP status, so
//! remote 4xx/5xx failures arrive at the dispatcher already typed.  When a
//! credential is supplied it is sent as a bearer token.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::traits::{Capability, CapabilityDescriptor, ParameterSpec};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response body size in bytes (1 MB).
const MAX_BODY_BYTES: usize = 1_024 * 1_024;

const TOOL_NAME: &str = "http_request";

pub struct HttpRequestCapability {
    descriptor: CapabilityDescriptor,
    client: reqwest::Client,
}

impl HttpRequestCapability {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("IntentGate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let descriptor = CapabilityDescriptor::new(
            TOOL_NAME,
            "Make an HTTP request (GET, POST, PUT, PATCH, DELETE or HEAD)",
        )
        .with_parameter(ParameterSpec::required("method", "HTTP method"))
        .with_parameter(ParameterSpec::required("url", "The URL to send the request to"))
        .with_parameter(ParameterSpec::optional("body", "Optional request body"));

        Self { descriptor, client }
    }
}

impl Default for HttpRequestCapability {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(reason: String) -> AdapterError {
    AdapterError::InvalidParams {
        tool_name: TOOL_NAME.into(),
        reason,
    }
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("missing required string field `{field}`")))
}

/// Parse an HTTP method string into a `reqwest::Method`.
/// Returns `None` if the method is not supported.
fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}

#[async_trait]
impl Capability for HttpRequestCapability {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, params: Value, credential: Option<&str>) -> Result<Value> {
        let method_str = required_str(&params, "method")?;
        let url_str = required_str(&params, "url")?;

        let method = parse_method(method_str)
            .ok_or_else(|| invalid(format!("unsupported HTTP method `{method_str}`")))?;
        let url = url::Url::parse(url_str)
            .map_err(|e| invalid(format!("invalid URL `{url_str}`: {e}")))?;

        let mut request = self.client.request(method, url);
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }
        if let Some(body) = params.get("body").and_then(Value::as_str) {
            request = request.body(body.to_owned());
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    seconds: DEFAULT_TIMEOUT_SECS,
                    reason: format!("HTTP request to `{url_str}` timed out"),
                }
            } else {
                AdapterError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: format!("HTTP request failed: {e}"),
                }
            }
        })?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("failed to read response body: {e}"),
            })?;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_BYTES)]).into_owned();

        debug!(
            method = method_str,
            url = url_str,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms,
            "HTTP request completed"
        );

        if !status.is_success() {
            return Err(AdapterError::Provider {
                tool_name: TOOL_NAME.into(),
                status: Some(status.as_u16()),
                message: body.chars().take(500).collect(),
            });
        }

        Ok(json!({
            "status": status.as_u16(),
            "body": body,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
