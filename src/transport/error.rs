//! Transport error types

use thiserror::Error;

/// Transport failure with classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("Server responded with HTTP {status}")
        } else {
            format!("Server responded with HTTP {status}: {body}")
        };
        Self {
            kind: TransportErrorKind::Status,
            message,
            status: Some(status),
        }
    }

    pub fn empty_body() -> Self {
        Self::new(TransportErrorKind::EmptyBody, "Server returned an empty response")
    }

    pub fn incomplete() -> Self {
        Self::new(
            TransportErrorKind::Incomplete,
            "Connection closed before the response finished",
        )
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, timed out
    Network,
    /// Non-success HTTP status
    Status,
    /// Response carried no body at all
    EmptyBody,
    /// Stream ended without a terminal event
    Incomplete,
    /// Producer could not be used (misconfiguration, no script)
    Unavailable,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            TransportError::network(format!("Connection failed: {e}"))
        } else if let Some(status) = e.status() {
            TransportError::status(status.as_u16(), &e.to_string())
        } else {
            TransportError::network(format!("Request failed: {e}"))
        }
    }
}
