//! Login and stored-session management.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use waygate_core::Environment;
use waygate_store::{IdentityStore, StoredUser};

use crate::{
    error::{ApiError, ApiErrorKind},
    http::{ApiClient, json_message},
};

const LOGIN_PATH: &str = "/auth/user/login";

/// Characters refused in credentials before anything is sent.
const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '\'', '&'];

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Login name.
    pub username: String,
    /// Bearer token.
    pub token: String,
    /// Expiry, epoch milliseconds.
    pub expires_at_ms: u64,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Login client that persists the resulting session.
#[derive(Debug, Clone)]
pub struct AuthClient<E: Environment> {
    client: ApiClient,
    identity: IdentityStore,
    env: E,
}

impl<E: Environment> AuthClient<E> {
    /// Create a client.
    pub fn new(client: ApiClient, identity: IdentityStore, env: E) -> Self {
        Self { client, identity, env }
    }

    /// Exchange credentials for a token and persist the session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        validate_credentials(username, password)?;

        let response = self
            .client
            .post(LOGIN_PATH, None)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(login_transport_failure)?;

        let status = response.status();
        let body = response.text().await.map_err(login_transport_failure)?;
        let value = parse_body(status, &body)?;

        if !status.is_success() {
            let err = classify_login_failure(status, &value);
            tracing::warn!(status = status.as_u16(), username, "login_rejected");
            return Err(err);
        }
        if status != StatusCode::OK {
            return Err(unexpected_format(status));
        }

        let token = extract_token(&value).map_err(|message| {
            ApiError::new(ApiErrorKind::MalformedResponse, Some(status.as_u16()), message)
        })?;

        let expires_at_ms =
            self.env.now_ms() + self.client.config().token_lifetime.as_millis() as u64;
        let user = StoredUser { username: username.to_string(), token_expiry: expires_at_ms };
        self.identity.save_session(&token, &user).map_err(|e| {
            tracing::error!(error = %e, "session_store_failed");
            ApiError::new(ApiErrorKind::Server, Some(500), "Failed to store authentication data")
        })?;

        tracing::info!(username, "login_succeeded");
        Ok(Session { username: username.to_string(), token, expires_at_ms })
    }

    /// Forget the stored session. Storage failures are logged.
    pub fn logout(&self) {
        if let Err(e) = self.identity.clear_session() {
            tracing::warn!(error = %e, "session_clear_failed");
        }
    }

    /// The stored session, if present and unexpired.
    ///
    /// An expired or unreadable session is cleared.
    pub fn current_session(&self) -> Option<Session> {
        match self.load_session() {
            Ok(Some(session)) if session.expires_at_ms < self.env.now_ms() => {
                tracing::info!(username = %session.username, "session_expired");
                self.logout();
                None
            },
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "session_corrupt");
                self.logout();
                None
            },
        }
    }

    /// A session exists and its token looks like a JWT.
    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some_and(|s| is_jwt_shaped(&s.token))
    }

    /// Stored bearer token, without an expiry check.
    pub fn token(&self) -> Option<String> {
        self.identity.auth_token().ok().flatten()
    }

    fn load_session(&self) -> Result<Option<Session>, waygate_store::StoreError> {
        let (Some(token), Some(user)) = (self.identity.auth_token()?, self.identity.user()?) else {
            return Ok(None);
        };
        let expires_at_ms = self.identity.token_expiry_ms()?.unwrap_or(user.token_expiry);
        Ok(Some(Session { username: user.username, token, expires_at_ms }))
    }
}

/// Client-side credential checks, applied before any request.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }
    if username.trim().is_empty() {
        return Err(ApiError::validation("Username cannot be empty"));
    }
    if password.trim().is_empty() {
        return Err(ApiError::validation("Password cannot be empty"));
    }
    if username.contains(FORBIDDEN_CHARS) || password.contains(FORBIDDEN_CHARS) {
        return Err(ApiError::validation("Invalid characters in username or password"));
    }
    Ok(())
}

/// Classify a non-2xx login response.
pub fn classify_login_failure(status: StatusCode, body: &Value) -> ApiError {
    let code = status.as_u16();
    let kind = match code {
        400 => ApiErrorKind::Validation,
        401 => ApiErrorKind::Unauthorized,
        429 => ApiErrorKind::RateLimited,
        _ => ApiErrorKind::Server,
    };
    let message = json_message(body).unwrap_or_else(|| match code {
        400 => "Username and password are required".to_string(),
        401 => "Invalid username or password".to_string(),
        429 => "Too many login attempts. Please try again later.".to_string(),
        500 => "An error occurred during the login process.".to_string(),
        503 => "Service temporarily unavailable. Please try again later.".to_string(),
        _ => format!("Login failed with status {code}"),
    });
    ApiError::new(kind, Some(code), message)
}

/// Token from a direct `{token}` or wrapped `{success, data: {token}}` body.
pub fn extract_token(body: &Value) -> Result<String, &'static str> {
    let token_of = |v: &Value| v.get("token").and_then(Value::as_str).map(str::to_string);

    let wrapped = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    let token = match token_of(body) {
        Some(token) => token,
        None => match body.get("data").filter(|d| wrapped && d.is_object()) {
            Some(data) => token_of(data).unwrap_or_default(),
            None => return Err("Unexpected response format"),
        },
    };
    if token.is_empty() {
        return Err("No token received from server");
    }
    Ok(token)
}

/// Three dot-separated segments.
pub fn is_jwt_shaped(token: &str) -> bool {
    token.split('.').count() == 3
}

fn parse_body(status: StatusCode, body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(body).map_err(|_| {
        ApiError::new(
            ApiErrorKind::MalformedResponse,
            Some(status.as_u16()),
            "Invalid response from server",
        )
    })
}

fn unexpected_format(status: StatusCode) -> ApiError {
    ApiError::new(ApiErrorKind::MalformedResponse, Some(status.as_u16()), "Unexpected response format")
}

fn login_transport_failure(err: reqwest::Error) -> ApiError {
    tracing::warn!(error = %err, "login_transport_failed");
    let kind = if err.is_timeout() { ApiErrorKind::Timeout } else { ApiErrorKind::Network };
    ApiError::new(kind, None, "Unable to reach the server")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn credential_validation() {
        assert_eq!(validate_credentials("", "pw").unwrap_err().message, "Username and password are required");
        assert_eq!(validate_credentials("  ", "pw").unwrap_err().message, "Username cannot be empty");
        assert_eq!(validate_credentials("bob", " ").unwrap_err().message, "Password cannot be empty");
        assert_eq!(
            validate_credentials("bob<", "pw").unwrap_err().message,
            "Invalid characters in username or password"
        );
        assert_eq!(validate_credentials("bob", "p&w").unwrap_err().status, Some(400));
        assert!(validate_credentials("bob", "hunter2").is_ok());
    }

    #[test]
    fn token_extraction() {
        assert_eq!(extract_token(&json!({"token": "a.b.c"})), Ok("a.b.c".to_string()));
        assert_eq!(
            extract_token(&json!({"success": true, "data": {"token": "x.y.z"}})),
            Ok("x.y.z".to_string())
        );
        assert_eq!(
            extract_token(&json!({"success": true, "data": {}})),
            Err("No token received from server")
        );
        assert_eq!(extract_token(&json!({"success": false, "data": {"token": "t"}})), Err("Unexpected response format"));
        assert_eq!(extract_token(&json!({})), Err("Unexpected response format"));
        assert_eq!(extract_token(&json!({"token": ""})), Err("No token received from server"));
    }

    #[test]
    fn login_failure_messages() {
        let empty = json!({});
        let cases = [
            (400, "Username and password are required", ApiErrorKind::Validation),
            (401, "Invalid username or password", ApiErrorKind::Unauthorized),
            (429, "Too many login attempts. Please try again later.", ApiErrorKind::RateLimited),
            (500, "An error occurred during the login process.", ApiErrorKind::Server),
            (503, "Service temporarily unavailable. Please try again later.", ApiErrorKind::Server),
            (418, "Login failed with status 418", ApiErrorKind::Server),
        ];
        for (code, message, kind) in cases {
            let err = classify_login_failure(StatusCode::from_u16(code).unwrap(), &empty);
            assert_eq!(err.message, message);
            assert_eq!(err.kind, kind);
        }

        let err = classify_login_failure(StatusCode::UNAUTHORIZED, &json!({"error": "Account locked"}));
        assert_eq!(err.message, "Account locked");
    }

    #[test]
    fn jwt_shape() {
        assert!(is_jwt_shaped("a.b.c"));
        assert!(!is_jwt_shaped("a.b"));
        assert!(!is_jwt_shaped("opaque"));
    }
}
