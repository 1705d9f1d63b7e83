//! Error types for AuthSession
//!
//! Everything that can go wrong while talking to the identity authority or
//! loading configuration is an `AppError`. The session itself never hands a
//! reconciliation failure back to its caller; it records the error and falls
//! back to the anonymous state.

use std::time::Duration;

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authority base URL or endpoint path could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport error (connection refused, TLS, reset)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Identity authority answered with a non-success status
    #[error("Unexpected status from identity authority: {0}")]
    UnexpectedStatus(u16),

    /// Identity authority answered with a body we could not interpret
    #[error("Malformed identity payload: {0}")]
    MalformedPayload(String),

    /// Identity authority did not answer within the configured bound
    #[error("Identity check timed out after {0:?}")]
    Timeout(Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for the `error_type` metric dimension
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::InvalidUrl(_) => "invalid_url",
            AppError::HttpClient(_) => "http_client",
            AppError::UnexpectedStatus(_) => "unexpected_status",
            AppError::MalformedPayload(_) => "malformed_payload",
            AppError::Timeout(_) => "timeout",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether this error is one of the reconciliation failure shapes
    /// (network, non-success response, malformed payload, timeout)
    pub fn is_reconciliation_failure(&self) -> bool {
        matches!(
            self,
            AppError::HttpClient(_)
                | AppError::UnexpectedStatus(_)
                | AppError::MalformedPayload(_)
                | AppError::Timeout(_)
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
