//! Error types for webhook delivery and the manager API.
//!
//! Transport failures are recorded on the execution unit as the error's
//! display text, so the messages here double as the persisted `last_error`.

use std::time::Duration;

use hookrelay_core::CoreError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for webhook delivery and manager operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure
        message: String,
    },

    /// Request aborted after exceeding the connection timeout.
    #[error("request timeout after {}ms", timeout.as_millis())]
    Timeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Endpoint answered with anything other than HTTP 200.
    #[error("unexpected status: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code returned by the endpoint
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Storage error message
        message: String,
    },

    /// A webhook URL failed validation at registration.
    #[error("invalid webhook url: {url}")]
    InvalidWebhookUrl {
        /// The rejected URL
        url: String,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Workers did not stop within the shutdown timeout.
    #[error("shutdown timed out after {}s", timeout.as_secs())]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Index of the worker that panicked
        worker_id: usize,
        /// Panic message
        error: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Creates an error for a non-200 response.
    pub fn unexpected_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus { status_code, body: body.into() }
    }

    /// Creates an invalid webhook URL error.
    pub fn invalid_webhook_url(url: impl Into<String>) -> Self {
        Self::InvalidWebhookUrl { url: url.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this error came from a delivery attempt rather than from the
    /// engine itself.
    ///
    /// Delivery failures are recorded on the unit and retried; everything else
    /// aborts the worker run without touching the unit's attempt count.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. } | Self::UnexpectedStatus { .. })
    }
}

impl From<CoreError> for DeliveryError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(message) => Self::Configuration { message },
            other => Self::Storage { message: other.to_string() },
        }
    }
}
