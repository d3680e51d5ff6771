//! Composition: identity store, API clients and bridge selection.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use waygate_api::{ApiClient, ApiConfig, AuthClient, VpnConfigClient};
use waygate_app::Services;
use waygate_bridge::{NativeBridge, SimulatedBridge, SimulationConfig, TunnelBridge};
use waygate_core::SystemEnv;
use waygate_store::{FileStore, IdentityStore};

use crate::error::CliError;

const STATE_FILE: &str = "identity.json";
const SOCKET_FILE: &str = "waygate-plugin.sock";

/// Settings collected from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Backend base URL; the default backend when `None`.
    pub api_url: Option<String>,
    /// Directory holding `identity.json`.
    pub state_dir: Option<PathBuf>,
    /// Tunnel plugin socket.
    pub plugin_socket: Option<PathBuf>,
    /// Use the simulated bridge even when a plugin is reachable.
    pub simulate: bool,
}

impl Settings {
    /// API configuration.
    pub fn api_config(&self) -> ApiConfig {
        match &self.api_url {
            Some(url) => ApiConfig::with_base_url(url.clone()),
            None => ApiConfig::default(),
        }
    }

    /// Path of the identity file.
    pub fn state_path(&self) -> Result<PathBuf, CliError> {
        let dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => dirs::config_dir().ok_or(CliError::NoStateDir)?.join("waygate"),
        };
        Ok(dir.join(STATE_FILE))
    }

    /// Plugin socket to try, if any.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.plugin_socket.clone().or_else(|| dirs::runtime_dir().map(|dir| dir.join(SOCKET_FILE)))
    }
}

/// Open the identity store, creating its directory on first use.
pub fn open_identity(settings: &Settings) -> Result<IdentityStore, CliError> {
    let path = settings.state_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = FileStore::open(path)?;
    Ok(IdentityStore::new(Arc::new(store)))
}

/// Auth client over the identity store.
pub fn auth_client(settings: &Settings, identity: &IdentityStore) -> Result<AuthClient<SystemEnv>, CliError> {
    let client = ApiClient::new(settings.api_config())?;
    Ok(AuthClient::new(client, identity.clone(), SystemEnv))
}

/// Wire up the runtime's services.
pub async fn services(settings: &Settings, identity: &IdentityStore) -> Result<Services, CliError> {
    let client = ApiClient::new(settings.api_config())?;
    let bridge = select_bridge(settings, identity).await;
    Ok(Services {
        bridge,
        config_source: Arc::new(VpnConfigClient::new(client)),
        identity: identity.clone(),
    })
}

/// Native bridge when a plugin answers on the socket, simulated otherwise.
async fn select_bridge(settings: &Settings, identity: &IdentityStore) -> Arc<dyn TunnelBridge> {
    let socket = if settings.simulate { None } else { settings.socket_path().filter(|p| p.exists()) };
    if let Some(path) = socket {
        match connect_native(&path, identity).await {
            Ok(bridge) => return bridge,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "plugin_unreachable"),
        }
    }
    tracing::info!("using_simulated_bridge");
    Arc::new(SimulatedBridge::new(identity.clone(), SimulationConfig::default(), SystemEnv))
}

#[cfg(unix)]
async fn connect_native(
    path: &Path,
    identity: &IdentityStore,
) -> Result<Arc<dyn TunnelBridge>, waygate_bridge::PluginError> {
    let host = waygate_bridge::SocketPluginHost::connect(path).await?;
    tracing::info!(path = %path.display(), "using_native_bridge");
    Ok(Arc::new(NativeBridge::connect(Arc::new(host), identity.clone(), SystemEnv).await))
}

#[cfg(not(unix))]
async fn connect_native(
    _path: &Path,
    _identity: &IdentityStore,
) -> Result<Arc<dyn TunnelBridge>, waygate_bridge::PluginError> {
    Err(waygate_bridge::PluginError::Protocol("plugin sockets need a unix platform".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_state_dir_wins() {
        let settings = Settings { state_dir: Some("/tmp/wg".into()), ..Default::default() };
        assert_eq!(settings.state_path().unwrap(), PathBuf::from("/tmp/wg/identity.json"));
    }

    #[test]
    fn api_url_override() {
        let settings = Settings { api_url: Some("http://127.0.0.1:9/api".into()), ..Default::default() };
        assert_eq!(settings.api_config().base_url, "http://127.0.0.1:9/api");
        assert_eq!(Settings::default().api_config(), ApiConfig::default());
    }

    #[tokio::test]
    async fn simulate_flag_picks_simulated_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            state_dir: Some(dir.path().to_path_buf()),
            plugin_socket: Some(dir.path().join("missing.sock")),
            simulate: true,
            ..Default::default()
        };
        let identity = open_identity(&settings).unwrap();
        let services = services(&settings, &identity).await.unwrap();
        assert!(!services.bridge.is_native());
    }

    #[tokio::test]
    async fn missing_socket_falls_back_to_simulated() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            state_dir: Some(dir.path().to_path_buf()),
            plugin_socket: Some(dir.path().join("missing.sock")),
            ..Default::default()
        };
        let identity = open_identity(&settings).unwrap();
        assert!(!services(&settings, &identity).await.unwrap().bridge.is_native());
    }
}
