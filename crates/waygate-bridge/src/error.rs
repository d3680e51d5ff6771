//! Bridge errors.

use thiserror::Error;
use waygate_core::ErrorKind;
use waygate_store::StoreError;

/// Failure talking to the native plugin host.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Could not reach the plugin host.
    #[error("plugin host unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The plugin ran the action and reported failure.
    #[error("{action} rejected by plugin: {message}")]
    Rejected {
        /// Plugin action.
        action: String,
        /// Plugin-supplied reason.
        message: String,
    },

    /// The plugin accepted the call but did not answer before the deadline.
    #[error("plugin did not answer {action} in time")]
    TimedOut {
        /// Plugin action.
        action: String,
    },

    /// The plugin host went away with the call outstanding.
    #[error("plugin host connection closed")]
    Closed,

    /// A frame could not be encoded or decoded.
    #[error("malformed plugin frame: {0}")]
    Protocol(String),
}

/// Errors from [`crate::TunnelBridge`] calls.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The access descriptor failed the scheme check; nothing was sent.
    #[error("{0}")]
    InvalidConfig(String),

    /// The native layer rejected or could not run the call.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The persisted tunnel handle could not be read or written.
    #[error("tunnel handle store failed: {0}")]
    Store(#[from] StoreError),
}

impl BridgeError {
    /// Failure class for the connection record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Plugin(_) | Self::Store(_) => ErrorKind::BridgeFailure,
        }
    }
}
