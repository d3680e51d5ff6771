//! Error types surfaced to callers and to the connection record.

use thiserror::Error;

use crate::{reconciler::Operation, record::ConnectionStatus};

/// Failure classes a connection attempt can end in.
///
/// Every path into [`ConnectionStatus::Error`] carries one of these, whether
/// the failure came from the config backend, descriptor validation or the
/// native bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No auth token, or the backend rejected it.
    Unauthorized,
    /// Backend has no eligible server. Retrying is a user decision.
    NoServerAvailable,
    /// Backend did not answer within the fetch deadline.
    Timeout,
    /// Backend answered 2xx with an unusable payload.
    MalformedResponse,
    /// Access descriptor failed the scheme check.
    InvalidConfig,
    /// The native layer rejected a call or reported an unrecognized status.
    BridgeFailure,
    /// Any other transport or server failure.
    NetworkError,
}

impl ErrorKind {
    /// Whether an immediate manual retry has a reasonable chance of success.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError | Self::BridgeFailure)
    }
}

/// A classified, human-readable connection failure.
///
/// `Display` renders only the message, which is written for direct display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Message suitable for showing to the user.
    pub message: String,
}

impl ConnectError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Access descriptor rejected by the scheme check.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// Native layer failure.
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BridgeFailure, message)
    }
}

/// Why a user-initiated action did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Another user action is still in flight.
    #[error("another connection action is already in progress")]
    Busy,

    /// The action is not legal from the current status.
    #[error("cannot {operation} while {status}")]
    InvalidTransition {
        /// Requested operation.
        operation: Operation,
        /// Status at the time of the request.
        status: ConnectionStatus,
    },

    /// The action ran and failed.
    #[error(transparent)]
    Failed(#[from] ConnectError),

    /// The runtime that owns the connection has stopped.
    #[error("connection runtime has shut down")]
    RuntimeClosed,
}
