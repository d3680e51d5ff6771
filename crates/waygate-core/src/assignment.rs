//! Server assignment returned by the VPN config backend.

use serde::{Deserialize, Serialize};

/// A server the backend picked for one connect attempt.
///
/// Fetched fresh on every attempt and never cached, since the backend may
/// pick a different physical server each time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAssignment {
    /// Access descriptor (`ss:` URI) for the assigned server.
    pub access_url: String,
    /// Human-friendly server name, e.g. `Server-TX-3`.
    pub server_name: String,
    /// Backend identifier of the server.
    pub server_id: i64,
}

impl ServerAssignment {
    /// Construct an assignment.
    pub fn new(access_url: impl Into<String>, server_name: impl Into<String>, server_id: i64) -> Self {
        Self { access_url: access_url.into(), server_name: server_name.into(), server_id }
    }
}
