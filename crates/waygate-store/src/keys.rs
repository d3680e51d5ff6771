//! Storage keys shared with earlier releases of the client.

/// Bearer token from the last successful login.
pub const AUTH_TOKEN: &str = "vpn_auth_token";

/// JSON-encoded [`crate::StoredUser`].
pub const AUTH_USER: &str = "vpn_user_data";

/// Token expiry as epoch milliseconds.
pub const TOKEN_EXPIRY: &str = "vpn_token_expiry";

/// Handle of the tunnel this client last started.
pub const ACTIVE_TUNNEL: &str = "tg_active_tunnel_id";
