//! VPN config fetch.

use async_trait::async_trait;
use reqwest::StatusCode;
use waygate_core::ServerAssignment;

use crate::{
    error::{ApiError, ApiErrorKind},
    http::{ApiClient, error_message},
};

const VPN_CONFIG_PATH: &str = "/user/vpnconfig";

const MALFORMED_MESSAGE: &str = "Unexpected VPN config response format";
const TIMEOUT_MESSAGE: &str = "Request timed out while fetching VPN config";
const NETWORK_MESSAGE: &str = "Network error while fetching VPN config";

/// Source of fresh server assignments.
///
/// Called once per connect attempt; results are never cached.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch an assignment for the holder of `token`.
    async fn fetch(&self, token: Option<&str>) -> Result<ServerAssignment, ApiError>;
}

/// [`ConfigSource`] backed by `GET /user/vpnconfig`.
#[derive(Debug, Clone)]
pub struct VpnConfigClient {
    client: ApiClient,
}

impl VpnConfigClient {
    /// Wrap an HTTP client.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigSource for VpnConfigClient {
    async fn fetch(&self, token: Option<&str>) -> Result<ServerAssignment, ApiError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(ApiError::new(ApiErrorKind::Unauthorized, Some(401), "Unauthorized"));
        };

        // The deadline covers the body too; on expiry the request is dropped.
        let response = self
            .client
            .get(VPN_CONFIG_PATH, Some(token))
            .timeout(self.client.config().fetch_timeout)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            tracing::warn!(status = status.as_u16(), kind = ?err.kind, "vpn_config_rejected");
            return Err(err);
        }

        let assignment = parse_assignment(&body)?;
        tracing::info!(server = %assignment.server_name, server_id = assignment.server_id, "vpn_config_fetched");
        Ok(assignment)
    }
}

fn transport_failure(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        tracing::warn!("vpn_config_timeout");
        ApiError::new(ApiErrorKind::Timeout, Some(408), TIMEOUT_MESSAGE)
    } else {
        tracing::warn!(error = %err, "vpn_config_transport_failed");
        ApiError::new(ApiErrorKind::Network, None, NETWORK_MESSAGE)
    }
}

/// Classify a non-2xx config response.
pub fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    let code = status.as_u16();
    let (kind, fallback) = match code {
        401 => (ApiErrorKind::Unauthorized, "Unauthorized".to_string()),
        404 => (
            ApiErrorKind::NoServerAvailable,
            "No online servers available or no access key found for the selected server"
                .to_string(),
        ),
        500 => (ApiErrorKind::Server, "An error occurred while fetching the VPN config.".to_string()),
        _ => (ApiErrorKind::Server, format!("Failed to fetch VPN config (HTTP {code})")),
    };
    ApiError::new(kind, Some(code), error_message(body).unwrap_or(fallback))
}

/// Validate and decode a 2xx config body.
///
/// `accessUrl` and `serverName` must be non-empty strings and `serverId` a
/// number.
pub fn parse_assignment(body: &str) -> Result<ServerAssignment, ApiError> {
    let malformed = || ApiError::new(ApiErrorKind::MalformedResponse, Some(500), MALFORMED_MESSAGE);

    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| malformed())?;
    let non_empty = |field: &str| {
        value.get(field).and_then(serde_json::Value::as_str).filter(|s| !s.is_empty())
    };

    let access_url = non_empty("accessUrl").ok_or_else(malformed)?;
    let server_name = non_empty("serverName").ok_or_else(malformed)?;
    let server_id = value
        .get("serverId")
        .and_then(|id| id.as_i64().or_else(|| id.as_f64().map(|f| f as i64)))
        .ok_or_else(malformed)?;

    Ok(ServerAssignment::new(access_url, server_name, server_id))
}
