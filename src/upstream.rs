//!
//! HTTP client for the upstream chat-completions API.
//!
//! Owns the pooled reqwest client, the endpoint and the bearer credential. The
//! credential is handed in at construction time and is never logged.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::shaping::OutboundRequest;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Client for the upstream completion endpoint.
#[derive(Clone)]
pub struct UpstreamClient {
    /** pooled HTTP client */
    http_client: Client,
    /** full chat-completions URL */
    url: String,
    /** bearer credential */
    api_key: String,
    /** bound on waiting for upstream to start answering */
    timeout: Duration,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Content type header for JSON requests */
const CONTENT_TYPE_JSON: &str = "application/json";

/** Authorization header name */
const AUTHORIZATION_HEADER: &str = "Authorization";

/** Bearer token prefix */
const BEARER_PREFIX: &str = "Bearer ";

/** Placeholder when the upstream error body cannot be read */
const UNKNOWN_ERROR: &str = "Unknown error";

/** Placeholder when the upstream error body stalls */
const STALLED_ERROR_BODY: &str = "error body did not arrive in time";

/* --- start of code -------------------------------------------------------------------------- */

impl UpstreamClient {
    ///
    /// Create an upstream client from configuration.
    ///
    /// # Returns
    ///  * Configured client
    ///  * `RelayError::Http` if the HTTP client cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| RelayError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: config.upstream_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.upstream_timeout,
        })
    }

    ///
    /// Start an upstream call without inspecting the status.
    ///
    /// Only the time until response headers arrive is bounded; a streamed body may
    /// take longer.
    ///
    /// # Arguments
    ///  * `payload` - composed outbound request
    ///
    /// # Returns
    ///  * Raw upstream response
    ///  * `RelayError::Network` if upstream cannot be reached or does not answer in time
    pub async fn send(&self, payload: &OutboundRequest) -> Result<reqwest::Response> {
        let request = self
            .http_client
            .post(&self.url)
            .header(AUTHORIZATION_HEADER, format!("{}{}", BEARER_PREFIX, self.api_key))
            .header("Content-Type", CONTENT_TYPE_JSON)
            .json(payload)
            .send();

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                tracing::warn!("Upstream request failed: {}", e);
                Err(RelayError::Network(e.to_string()))
            }
            Err(_) => {
                tracing::warn!("Upstream did not answer within {:?}", self.timeout);
                Err(RelayError::Network(format!(
                    "upstream did not respond within {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    ///
    /// Run a buffered completion and extract the assistant message.
    ///
    /// # Arguments
    ///  * `payload` - composed outbound request with `stream` false
    ///
    /// # Returns
    ///  * The upstream `choices[0].message` object, verbatim
    ///  * `RelayError::Upstream` on a non-success status, with the upstream body
    ///  * `RelayError::EmptyCompletion` if no content came back
    ///  * `RelayError::Network` if upstream cannot be reached
    pub async fn complete(&self, payload: &OutboundRequest) -> Result<Value> {
        let response = self.ensure_success(self.send(payload).await?).await?;

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| RelayError::Network("upstream body did not arrive in time".to_string()))?
            .map_err(|e| RelayError::Network(e.to_string()))?;

        extract_message(&body)
    }

    ///
    /// Turn a non-success upstream response into `RelayError::Upstream`.
    ///
    /// Reading the error body is bounded by the same timeout as the call itself; an
    /// upstream that sends its status and then stalls still yields an error.
    ///
    /// # Arguments
    ///  * `response` - raw upstream response
    ///
    /// # Returns
    ///  * The same response if its status is 2xx
    ///  * `RelayError::Upstream` carrying the status and body text otherwise
    pub async fn ensure_success(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match tokio::time::timeout(self.timeout, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => UNKNOWN_ERROR.to_string(),
            Err(_) => {
                tracing::warn!("Upstream error body did not arrive within {:?}", self.timeout);
                STALLED_ERROR_BODY.to_string()
            }
        };
        tracing::error!("Upstream error ({}): {}", status, body);

        Err(RelayError::Upstream { status: status.as_u16(), body })
    }
}

///
/// Pull `choices[0].message` out of an upstream completion body.
///
/// A body that is not JSON, has no choices, or whose message content is missing or
/// empty counts as an empty completion.
pub fn extract_message(body: &str) -> Result<Value> {
    let data: Value = serde_json::from_str(body).map_err(|e| {
        tracing::warn!("Upstream completion body is not JSON: {}", e);
        RelayError::EmptyCompletion
    })?;

    let message = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or(RelayError::EmptyCompletion)?;

    match message.get("content").and_then(Value::as_str) {
        Some(content) if !content.is_empty() => Ok(message.clone()),
        _ => Err(RelayError::EmptyCompletion),
    }
}
