//! Typed facade over the durable keys.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{KeyValueStore, StoreError, keys};

/// User record written alongside the auth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    /// Login name.
    pub username: String,
    /// Token expiry, epoch milliseconds.
    pub token_expiry: u64,
}

/// The client's durable identity: auth session and active tunnel handle.
///
/// Cheap to clone; all clones share the same backing store.
#[derive(Clone)]
pub struct IdentityStore {
    inner: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore").finish_non_exhaustive()
    }
}

impl IdentityStore {
    /// Wrap a backing store.
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Stored bearer token.
    pub fn auth_token(&self) -> Result<Option<String>, StoreError> {
        self.inner.get(keys::AUTH_TOKEN)
    }

    /// Stored user record.
    pub fn user(&self) -> Result<Option<StoredUser>, StoreError> {
        self.inner
            .get(keys::AUTH_USER)?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| StoreError::InvalidValue {
                    key: keys::AUTH_USER,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Stored token expiry, epoch milliseconds.
    pub fn token_expiry_ms(&self) -> Result<Option<u64>, StoreError> {
        self.inner
            .get(keys::TOKEN_EXPIRY)?
            .map(|raw| {
                raw.trim().parse().map_err(|_| StoreError::InvalidValue {
                    key: keys::TOKEN_EXPIRY,
                    reason: format!("not an epoch timestamp: {raw:?}"),
                })
            })
            .transpose()
    }

    /// Persist a new auth session.
    pub fn save_session(&self, token: &str, user: &StoredUser) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(user)?;
        self.inner.set(keys::AUTH_TOKEN, token)?;
        self.inner.set(keys::AUTH_USER, &encoded)?;
        self.inner.set(keys::TOKEN_EXPIRY, &user.token_expiry.to_string())?;
        tracing::info!(username = %user.username, "session_saved");
        Ok(())
    }

    /// Forget the auth session.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.inner.remove(keys::AUTH_TOKEN)?;
        self.inner.remove(keys::AUTH_USER)?;
        self.inner.remove(keys::TOKEN_EXPIRY)?;
        tracing::info!("session_cleared");
        Ok(())
    }

    /// Persisted tunnel handle.
    pub fn tunnel_handle(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(keys::ACTIVE_TUNNEL)?.filter(|id| !id.is_empty()))
    }

    /// Return the persisted handle, minting and persisting one if absent.
    ///
    /// A present handle is never regenerated.
    pub fn ensure_tunnel_handle(&self, mint: impl FnOnce() -> String) -> Result<String, StoreError> {
        if let Some(existing) = self.tunnel_handle()? {
            return Ok(existing);
        }
        let minted = mint();
        self.set_tunnel_handle(&minted)?;
        Ok(minted)
    }

    /// Persist `tunnel_id` as the active handle.
    pub fn set_tunnel_handle(&self, tunnel_id: &str) -> Result<(), StoreError> {
        self.inner.set(keys::ACTIVE_TUNNEL, tunnel_id)?;
        tracing::debug!(tunnel_id, "tunnel_handle_saved");
        Ok(())
    }

    /// Forget the active handle.
    pub fn clear_tunnel_handle(&self) -> Result<(), StoreError> {
        self.inner.remove(keys::ACTIVE_TUNNEL)?;
        tracing::debug!("tunnel_handle_cleared");
        Ok(())
    }
}
