// src/error.rs
//! Error types shared across the approval layer

use std::fmt;

/// Failure type produced by queued tasks. Never escapes the queue.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// What went wrong talking to the approval API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection, TLS or timeout failure before a response arrived
    Transport,
    /// Server answered with a non-success status code
    Status(u16),
    /// Response body did not match the expected shape
    Decode,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(code: u16, body: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Status(code), body)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Transport => write!(f, "approval API request failed: {}", self.message),
            ApiErrorKind::Status(code) => {
                write!(f, "approval API error {}: {}", code, self.message)
            }
            ApiErrorKind::Decode => {
                write!(f, "failed to parse approval API response: {}", self.message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::new(ApiErrorKind::Decode, e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::status(status.as_u16(), e.to_string())
        } else {
            ApiError::new(ApiErrorKind::Transport, e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::new(ApiErrorKind::Decode, e.to_string())
    }
}

/// Aggregation-level failure. Callers only ever see the zero snapshot it produces.
#[derive(Debug, Clone)]
pub struct AlertError(String);

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AlertError {}

impl From<String> for AlertError {
    fn from(s: String) -> Self {
        AlertError(s)
    }
}

impl From<&str> for AlertError {
    fn from(s: &str) -> Self {
        AlertError(s.to_string())
    }
}

impl From<ApiError> for AlertError {
    fn from(e: ApiError) -> Self {
        AlertError(e.to_string())
    }
}

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid approval config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl From<String> for ConfigError {
    fn from(s: String) -> Self {
        ConfigError(s)
    }
}

impl From<&str> for ConfigError {
    fn from(s: &str) -> Self {
        ConfigError(s.to_string())
    }
}
