//! Classified result of one network attempt.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified reason a single attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt exceeded its wall-clock budget or was aborted.
    Timeout,
    /// DNS, connect, or reset failure before a response arrived.
    NetworkUnreachable,
    /// 4xx other than 401.
    HttpClientError(u16),
    /// 5xx.
    HttpServerError(u16),
    /// Body or content type could not be understood.
    MalformedResponse,
    /// 401, or no usable credential.
    Unauthorized,
}

impl FailureKind {
    /// Maps a completed HTTP status to a failure kind; `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(Self::Unauthorized),
            400..=499 => Some(Self::HttpClientError(status)),
            500..=599 => Some(Self::HttpServerError(status)),
            _ => Some(Self::MalformedResponse),
        }
    }

    /// Whether re-issuing the same request may succeed.
    ///
    /// 408 is the only client error that counts.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::NetworkUnreachable
                | Self::HttpServerError(_)
                | Self::HttpClientError(408)
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::NetworkUnreachable => f.write_str("network unreachable"),
            Self::HttpClientError(status) => write!(f, "http client error {status}"),
            Self::HttpServerError(status) => write!(f, "http server error {status}"),
            Self::MalformedResponse => f.write_str("malformed response"),
            Self::Unauthorized => f.write_str("unauthorized"),
        }
    }
}

/// Failed outcome of an attempt: the kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Classification.
    pub kind: FailureKind,
    /// Upstream detail or a generic description.
    pub message: String,
}

impl Failure {
    /// Failure of `kind`.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `Timeout` failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// `NetworkUnreachable` failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkUnreachable, message)
    }

    /// `MalformedResponse` failure.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    /// `Unauthorized` failure.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, message)
    }

    /// Builds the failure for a completed non-2xx response.
    ///
    /// `detail` (the upstream's own message) wins over the generic one.
    pub fn from_status(status: u16, detail: Option<String>) -> Option<Self> {
        let kind = FailureKind::from_status(status)?;
        let message = detail.unwrap_or_else(|| match kind {
            FailureKind::Unauthorized => "session is no longer valid".to_string(),
            _ => format!("request failed with status {status}"),
        });
        Some(Self::new(kind, message))
    }

    /// True when the UI should offer a retry action.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// True when the caller must prompt for re-authentication.
    pub fn is_session_expired(&self) -> bool {
        self.kind == FailureKind::Unauthorized
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::HttpClientError(s) | FailureKind::HttpServerError(s) => Some(s),
            FailureKind::Unauthorized => Some(401),
            _ => None,
        }
    }
}

/// Result of one attempt (or of a whole retried sequence).
pub type Outcome<T> = Result<T, Failure>;
