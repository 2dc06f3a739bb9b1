//! Error types for scrape-engine
//!
//! Two layers:
//! - [`FetchError`] is the transport taxonomy returned as a value by a single
//!   fetch attempt. The retry policy classifies it.
//! - [`Error`] is the crate-level error for configuration and command failures.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for scrape-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scrape-engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "url")
        key: Option<String>,
    },

    /// A fetch attempt failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,
}

impl Error {
    /// Build a configuration error bound to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(e) => e.kind().as_str(),
            Error::InvalidUrl(_) => "invalid_url",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
        }
    }
}

/// Classification of a failed fetch attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The attempt exceeded its timeout
    Timeout,
    /// The connection could not be established
    ConnectFailed,
    /// The server spoke broken HTTP, or the redirect chain was invalid
    ProtocolError,
    /// A stop was requested before the request was sent
    Cancelled,
    /// Anything else (bad request construction, unsupported proxy, ...)
    Other,
}

impl FetchErrorKind {
    /// Stable lowercase name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::ConnectFailed => "connect_failed",
            FetchErrorKind::ProtocolError => "protocol_error",
            FetchErrorKind::Cancelled => "cancelled",
            FetchErrorKind::Other => "other",
        }
    }
}

/// Error returned by a single fetch attempt
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt exceeded its timeout
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The connection could not be established
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Protocol-level failure (malformed response, redirect loop, body error)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Stop was requested before the request went out
    #[error("request cancelled")]
    Cancelled,

    /// Unclassified failure
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// The classification of this error
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::ConnectFailed(_) => FetchErrorKind::ConnectFailed,
            FetchError::Protocol(_) => FetchErrorKind::ProtocolError,
            FetchError::Cancelled => FetchErrorKind::Cancelled,
            FetchError::Other(_) => FetchErrorKind::Other,
        }
    }

    /// Classify a reqwest error raised while sending a request or reading its body
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_connect() {
            FetchError::ConnectFailed(err.to_string())
        } else if err.is_redirect() || err.is_decode() || err.is_body() || err.is_request() {
            FetchError::Protocol(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}
