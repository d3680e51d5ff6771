//! API client configuration.

use std::time::Duration;

/// Backend location and request limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com/api`. No trailing slash.
    pub base_url: String,
    /// Hard deadline for a VPN config fetch. The request is aborted when it
    /// expires.
    pub fetch_timeout: Duration,
    /// Lifetime granted to a token after login.
    pub token_lifetime: Duration,
}

impl ApiConfig {
    /// Default configuration against `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            fetch_timeout: Duration::from_secs(15),
            token_lifetime: Duration::from_secs(24 * 60 * 60),
        }
    }
}
