use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the Usher distributed semaphore service
#[derive(Debug)]
pub enum UsherError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Semaphore state machine misuse and range errors
    Semaphore(SemaphoreError),

    /// API/HTTP related errors
    Api(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Heartbeat bus transport errors
    Transport(String),

    /// Heartbeat wire codec errors
    Serialization(serde_json::Error),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

/// Semaphore specific errors
///
/// These are the only failures that cross the public semaphore API. Anything
/// that goes wrong in the background (publish failures, undecodable
/// heartbeats) is logged and swallowed so the gossip loop keeps running.
#[derive(Debug)]
pub enum SemaphoreError {
    /// The instance was closed; acquiring or releasing it again is a caller bug
    Closed,

    /// Resource counts below 1 are rejected at the point of mutation
    InvalidResources(u32),
}

impl fmt::Display for UsherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsherError::Config(msg) => write!(f, "Configuration error: {}", msg),
            UsherError::Semaphore(err) => write!(f, "Semaphore error: {}", err),
            UsherError::Api(msg) => write!(f, "API error: {}", msg),
            UsherError::Io(err) => write!(f, "I/O error: {}", err),
            UsherError::Transport(msg) => write!(f, "Transport error: {}", msg),
            UsherError::Serialization(err) => write!(f, "Serialization error: {}", err),
            UsherError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl fmt::Display for SemaphoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaphoreError::Closed => write!(f, "semaphore instance has been closed"),
            SemaphoreError::InvalidResources(n) => {
                write!(f, "resource count must be at least 1 (got {})", n)
            }
        }
    }
}

impl std::error::Error for UsherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsherError::Io(err) => Some(err),
            UsherError::Serialization(err) => Some(err),
            UsherError::Semaphore(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for SemaphoreError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, UsherError>;

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for UsherError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl UsherError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UsherError::Config(_) => StatusCode::BAD_REQUEST,
            UsherError::Semaphore(SemaphoreError::Closed) => StatusCode::GONE,
            UsherError::Semaphore(SemaphoreError::InvalidResources(_)) => StatusCode::BAD_REQUEST,
            UsherError::Api(_) => StatusCode::BAD_REQUEST,
            UsherError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UsherError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            UsherError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UsherError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            UsherError::Config(_) => "configuration_error",
            UsherError::Semaphore(SemaphoreError::Closed) => "semaphore_closed",
            UsherError::Semaphore(SemaphoreError::InvalidResources(_)) => "invalid_resources",
            UsherError::Api(_) => "api_error",
            UsherError::Io(_) => "io_error",
            UsherError::Transport(_) => "transport_error",
            UsherError::Serialization(_) => "serialization_error",
            UsherError::Concurrency(_) => "concurrency_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for UsherError {
    fn from(err: std::io::Error) -> Self {
        UsherError::Io(err)
    }
}

impl From<serde_json::Error> for UsherError {
    fn from(err: serde_json::Error) -> Self {
        UsherError::Serialization(err)
    }
}

impl From<SemaphoreError> for UsherError {
    fn from(err: SemaphoreError) -> Self {
        UsherError::Semaphore(err)
    }
}

impl From<reqwest::Error> for UsherError {
    fn from(err: reqwest::Error) -> Self {
        UsherError::Api(err.to_string())
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::UsherError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::UsherError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::UsherError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::UsherError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::UsherError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::UsherError::Concurrency(format!($fmt, $($arg)*))
    };
}
