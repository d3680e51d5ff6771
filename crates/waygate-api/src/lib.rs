//! REST client for the Waygate backend.
//!
//! Two endpoints matter to the client:
//!
//! - `POST /auth/user/login` exchanges credentials for a bearer token
//!   ([`AuthClient`])
//! - `GET /user/vpnconfig` hands out a fresh server assignment for every
//!   connect attempt ([`VpnConfigClient`], behind the [`ConfigSource`] seam)
//!
//! No request is retried here. Every failure is classified into an
//! [`ApiError`] whose message is written for direct display; the caller
//! decides whether to try again.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod vpn_config;

pub use auth::{AuthClient, Session};
pub use config::ApiConfig;
pub use error::{ApiError, ApiErrorKind};
pub use http::ApiClient;
pub use vpn_config::{ConfigSource, VpnConfigClient};
