//! The connection record and the view published to presentation code.

use std::fmt;

use crate::{elapsed::elapsed_ms, error::ConnectError, reconciler::Operation};

/// Logical, user-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No tunnel is believed active.
    #[default]
    Disconnected,
    /// A connect attempt is running, or the native layer is reconnecting.
    Connecting,
    /// A tunnel is up.
    Connected,
    /// The last attempt failed; see [`ConnectionRecord::last_error`].
    Error,
}

impl ConnectionStatus {
    /// Lowercase machine name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting…",
            Self::Connected => "Connected",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single logical VPN connection of the process.
///
/// Only [`crate::Reconciler`] mutates it. Invariants after every transition:
/// - `connected_at_ms.is_some()` iff `status == Connected`
/// - `tunnel_id.is_none()` whenever `status == Disconnected` and no user
///   action is in flight
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Logical status.
    pub status: ConnectionStatus,
    /// Native tunnel believed active.
    pub tunnel_id: Option<String>,
    /// Server name from the last successful config fetch.
    pub server_name: Option<String>,
    /// Access descriptor from the last successful config fetch.
    pub access_endpoint: Option<String>,
    /// When the status last entered `Connected`.
    pub connected_at_ms: Option<u64>,
    /// Failure to show the user.
    pub last_error: Option<ConnectError>,
}

impl ConnectionRecord {
    /// Status is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Status is `Connecting`.
    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    /// Status is `Error` and there is a message to show.
    pub fn has_error(&self) -> bool {
        self.status == ConnectionStatus::Error && self.last_error.is_some()
    }

    /// Connected duration at `now_ms`, zero unless connected.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        if self.is_connected() { elapsed_ms(self.connected_at_ms, now_ms) } else { 0 }
    }
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionView {
    /// The connection record.
    pub record: ConnectionRecord,
    /// User action currently holding the in-flight lock.
    pub in_flight: Option<Operation>,
}

impl ConnectionView {
    /// A user action is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}
