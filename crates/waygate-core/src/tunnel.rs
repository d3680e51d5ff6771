//! Native tunnel status codes, push events, and bridge call outcomes.
//!
//! The native layer reports tunnel state as a small integer enumeration:
//!
//! | code | status        | family       |
//! |------|---------------|--------------|
//! | 0    | connected     | connected    |
//! | 1    | disconnected  | disconnected |
//! | 2    | reconnecting  | connecting   |
//! | 3    | disconnecting | disconnected |
//! | else | unrecognized  | error        |

use std::fmt;

/// Tunnel status as reported by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelStatus {
    /// Tunnel is up (code 0).
    Connected,
    /// Tunnel is down (code 1).
    Disconnected,
    /// Tunnel dropped and the native layer is re-establishing it (code 2).
    Reconnecting,
    /// Tunnel is being torn down (code 3).
    Disconnecting,
    /// Provisional result of a start request. Never sent on the wire.
    Connecting,
    /// Code outside the enumeration.
    Unrecognized(i64),
}

/// Coarse grouping the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFamily {
    /// Tunnel is up.
    Connected,
    /// Tunnel is coming up.
    Connecting,
    /// Tunnel is down or going down.
    Disconnected,
    /// Native layer reported something outside the enumeration.
    Unrecognized(i64),
}

impl TunnelStatus {
    /// Decode a wire status code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Connected,
            1 => Self::Disconnected,
            2 => Self::Reconnecting,
            3 => Self::Disconnecting,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire code, if this status has one.
    pub fn code(self) -> Option<i64> {
        match self {
            Self::Connected => Some(0),
            Self::Disconnected => Some(1),
            Self::Reconnecting => Some(2),
            Self::Disconnecting => Some(3),
            Self::Connecting => None,
            Self::Unrecognized(code) => Some(code),
        }
    }

    /// Coarse grouping used for reconciliation.
    pub fn family(self) -> StatusFamily {
        match self {
            Self::Connected => StatusFamily::Connected,
            Self::Connecting | Self::Reconnecting => StatusFamily::Connecting,
            Self::Disconnected | Self::Disconnecting => StatusFamily::Disconnected,
            Self::Unrecognized(code) => StatusFamily::Unrecognized(code),
        }
    }

    /// Lowercase name used in logs and bridge results.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
            Self::Connecting => "connecting",
            Self::Unrecognized(_) => "error",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsolicited status notification from the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Tunnel the notification is about.
    pub tunnel_id: String,
    /// Reported status.
    pub status: TunnelStatus,
}

impl StatusEvent {
    /// Construct an event.
    pub fn new(tunnel_id: impl Into<String>, status: TunnelStatus) -> Self {
        Self { tunnel_id: tunnel_id.into(), status }
    }
}

/// Result of a successful start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// Provisional status; the final one arrives as a push event.
    pub status: TunnelStatus,
    /// Handle of the tunnel being established.
    pub tunnel_id: String,
    /// Display name the tunnel was started under.
    pub server: String,
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    /// Always [`TunnelStatus::Disconnected`].
    pub status: TunnelStatus,
    /// Stopped tunnel, or empty when no tunnel was known.
    pub tunnel_id: String,
}

/// Point-in-time answer to "is the tunnel running".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunningState {
    /// Whether the tunnel is up.
    pub connected: bool,
    /// The running tunnel; `None` when nothing is running.
    pub tunnel_id: Option<String>,
}

const HANDLE_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Mint a tunnel handle of the form `tg-<base36 ms>-<6 base36 chars>`.
pub fn mint_tunnel_id(now_ms: u64, random: [u8; 6]) -> String {
    let suffix: String =
        random.iter().map(|b| char::from(HANDLE_ALPHABET[usize::from(*b) % 36])).collect();
    format!("tg-{}-{suffix}", to_base36(now_ms))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(HANDLE_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_map_to_families() {
        assert_eq!(TunnelStatus::from_code(0).family(), StatusFamily::Connected);
        assert_eq!(TunnelStatus::from_code(1).family(), StatusFamily::Disconnected);
        assert_eq!(TunnelStatus::from_code(2).family(), StatusFamily::Connecting);
        assert_eq!(TunnelStatus::from_code(3).family(), StatusFamily::Disconnected);
        assert_eq!(TunnelStatus::from_code(7).family(), StatusFamily::Unrecognized(7));
        assert_eq!(TunnelStatus::from_code(-1).family(), StatusFamily::Unrecognized(-1));
    }

    #[test]
    fn codes_round_trip_for_wire_statuses() {
        for code in 0..4 {
            assert_eq!(TunnelStatus::from_code(code).code(), Some(code));
        }
        assert_eq!(TunnelStatus::Connecting.code(), None);
    }

    #[test]
    fn unrecognized_renders_as_error() {
        assert_eq!(TunnelStatus::Unrecognized(9).to_string(), "error");
    }

    #[test]
    fn minted_handle_shape() {
        let id = mint_tunnel_id(1_700_000_000_000, [0, 1, 35, 36, 200, 255]);
        assert_eq!(id, "tg-loyw3v28-01z0k3");
    }

    #[test]
    fn base36_zero() {
        assert_eq!(mint_tunnel_id(0, [0; 6]), "tg-0-000000");
    }
}
