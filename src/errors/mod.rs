use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed error hierarchy for mailtrace.
///
/// Use at module boundaries (config validation, storage, relay hops, auth).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum MailTraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Relay failure: {0}")]
    Relay(#[from] RelayFailure),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Why a relay round-trip produced no result.
///
/// The page context treats every variant identically (tracking is skipped),
/// but the variants travel back up the chain so an authorization problem is
/// distinguishable from a timeout in logs and in the wire response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum RelayFailure {
    #[error("no auth token available")]
    NoToken,
    #[error("credential rejected by backend")]
    Unauthorized,
    #[error("backend returned HTTP {0}")]
    HttpError(u16),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("malformed backend response: {0}")]
    BadResponse(String),
}

impl RelayFailure {
    /// Stable wire code, matching the `code` field in relay responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::Unauthorized => "unauthorized",
            Self::HttpError(_) => "http_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout => "timeout",
            Self::BadResponse(_) => "bad_response",
        }
    }

    /// Whether the failure says nothing about the request itself: the next
    /// send may well succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::Timeout => true,
            Self::HttpError(status) => *status >= 500,
            Self::NoToken | Self::Unauthorized | Self::BadResponse(_) => false,
        }
    }
}
