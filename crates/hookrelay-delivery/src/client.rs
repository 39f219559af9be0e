//! HTTP client for webhook delivery with a bounded request timeout.
//!
//! Posts the notification JSON to a webhook and classifies the outcome. Only
//! an exact HTTP 200 counts as delivered; every other status, a timeout or a
//! transport failure is a failed attempt.

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Content type sent with every delivery.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Longest response body kept for logging.
const MAX_BODY_CHARS: usize = 1024;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound for the whole request, connect included.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: format!("hookrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Response from a webhook delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for logging.
    pub body: String,
}

impl DeliveryResponse {
    /// Whether the endpoint accepted the delivery.
    pub fn is_delivered(&self) -> bool {
        self.status_code == 200
    }

    /// Converts a rejected response into the error recorded on the unit.
    pub fn into_error(self) -> DeliveryError {
        DeliveryError::unexpected_status(self.status_code, self.body)
    }
}

/// HTTP client shared by all delivery workers.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs `body` to `url`.
    ///
    /// A response is returned for every status code; callers decide with
    /// [`DeliveryResponse::is_delivered`].
    ///
    /// # Errors
    ///
    /// - `Timeout` if the request exceeded the configured timeout
    /// - `Network` for connection and other transport failures
    pub async fn deliver(&self, url: &str, body: Vec<u8>) -> Result<DeliveryResponse> {
        let span = info_span!("webhook_delivery", url = %url, body_bytes = body.len());

        async move {
            let start = Instant::now();
            tracing::debug!("sending webhook");

            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .header(USER_AGENT, &self.config.user_agent)
                .body(body)
                .send()
                .await
                .map_err(|e| self.classify(&e, start.elapsed()))?;

            let status_code = response.status().as_u16();
            let body = match response.text().await {
                Ok(text) => truncate(text),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read response body");
                    format!("[failed to read response body: {e}]")
                },
            };
            let duration = start.elapsed();

            if status_code == 200 {
                tracing::debug!(duration_ms = duration.as_millis(), "webhook accepted");
            } else {
                tracing::warn!(
                    status = status_code,
                    duration_ms = duration.as_millis(),
                    "webhook rejected delivery"
                );
            }

            Ok(DeliveryResponse { status_code, body })
        }
        .instrument(span)
        .await
    }

    fn classify(&self, error: &reqwest::Error, elapsed: Duration) -> DeliveryError {
        tracing::warn!(duration_ms = elapsed.as_millis(), error = %error, "request failed");

        if error.is_timeout() {
            DeliveryError::timeout(self.config.timeout)
        } else if error.is_connect() {
            DeliveryError::network(format!("connection failed: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(MAX_BODY_CHARS).collect();
    truncated.push_str("... (truncated)");
    truncated
}
