//! API errors.

use thiserror::Error;
use waygate_core::{ConnectError, ErrorKind};

/// Failure class of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Input rejected before any request was sent.
    Validation,
    /// Missing token or credentials rejected.
    Unauthorized,
    /// Backend is throttling the client.
    RateLimited,
    /// Backend has no eligible server for this user.
    NoServerAvailable,
    /// No response within the deadline.
    Timeout,
    /// 2xx response with an unusable body.
    MalformedResponse,
    /// Backend reported a failure.
    Server,
    /// Transport-level failure.
    Network,
}

/// A classified API failure with a display-ready message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Failure class.
    pub kind: ApiErrorKind,
    /// HTTP status, when a response was received or implied.
    pub status: Option<u16>,
    /// Message suitable for showing to the user.
    pub message: String,
}

impl ApiError {
    /// Build an error.
    pub fn new(kind: ApiErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self { kind, status, message: message.into() }
    }

    /// Input validation failure, reported as a 400.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, Some(400), message)
    }
}

impl From<ApiError> for ConnectError {
    fn from(err: ApiError) -> Self {
        let kind = match err.kind {
            ApiErrorKind::Unauthorized => ErrorKind::Unauthorized,
            ApiErrorKind::NoServerAvailable => ErrorKind::NoServerAvailable,
            ApiErrorKind::Timeout => ErrorKind::Timeout,
            ApiErrorKind::MalformedResponse => ErrorKind::MalformedResponse,
            ApiErrorKind::Validation
            | ApiErrorKind::RateLimited
            | ApiErrorKind::Server
            | ApiErrorKind::Network => ErrorKind::NetworkError,
        };
        ConnectError::new(kind, err.message)
    }
}
