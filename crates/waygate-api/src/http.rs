//! Shared HTTP client.

use reqwest::{
    Client, RequestBuilder,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    config::ApiConfig,
    error::{ApiError, ApiErrorKind},
};

const USER_AGENT: &str = concat!("waygate/", env!("CARGO_PKG_VERSION"));

/// HTTP client preconfigured with the backend base URL and JSON headers.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Build a client for `config`.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::new(ApiErrorKind::Network, None, e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Build a GET request, with a bearer token if given.
    pub fn get(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        Self::with_auth(self.client.get(self.url(path)), token)
    }

    /// Build a POST request, with a bearer token if given.
    pub fn post(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        Self::with_auth(self.client.post(self.url(path)), token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_auth(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// JSON `message`, then JSON `error`, then the raw text. `None` for an empty
/// body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => json_message(&value).or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}

/// `message` or `error` string field of a JSON body.
pub(crate) fn json_message(value: &serde_json::Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|field| value.get(field).and_then(serde_json::Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_extraction_order() {
        assert_eq!(error_message(r#"{"message":"m","error":"e"}"#).as_deref(), Some("m"));
        assert_eq!(error_message(r#"{"error":"e"}"#).as_deref(), Some("e"));
        assert_eq!(error_message("plain failure").as_deref(), Some("plain failure"));
        assert_eq!(error_message(r#"{"code":7}"#).as_deref(), Some(r#"{"code":7}"#));
        assert_eq!(error_message("  "), None);
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = ApiClient::new(ApiConfig::with_base_url("http://h/api/")).unwrap();
        assert_eq!(client.url("/user/vpnconfig"), "http://h/api/user/vpnconfig");
    }
}
