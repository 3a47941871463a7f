//! Error types for the Ditto client

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`DittoError`]
pub type Result<T> = std::result::Result<T, DittoError>;

/// Main error type for the Ditto client
///
/// Cancellation is deliberately absent: a cancelled stream resolves with its
/// partial text rather than failing.
#[derive(Debug, Error)]
pub enum DittoError {
    /// Request rejected before any network call was made
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Non-2xx response, unreadable body, or a read failure mid-stream
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 402 from the backend (token balance exhausted)
    #[error("Payment required: please check your token balance")]
    PaymentRequired,

    /// Unrecoverable violation of the event-stream protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The auth provider could not produce a token
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration value that cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DittoError {
    /// Build a [`DittoError::Network`] from an unexpected HTTP status
    pub fn status(status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            DittoError::PaymentRequired
        } else {
            DittoError::Network(format!("HTTP error! status: {}", status.as_u16()))
        }
    }

    /// Whether this error happened before the request left the client
    #[must_use]
    pub fn is_client_side(&self) -> bool {
        matches!(self, DittoError::Validation(_) | DittoError::InvalidConfig(_))
    }
}
