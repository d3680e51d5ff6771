//! Runtime scenarios wired from scripted parts.

use std::sync::Arc;

use tokio::task::JoinHandle;
use waygate_app::{RuntimeConfig, RuntimeHandle, Services};
use waygate_store::{IdentityStore, MemoryStore};

use crate::{ScriptedBridge, ScriptedConfigSource, SimEnv};

/// A running runtime plus the scripted parts behind it.
#[derive(Debug)]
pub struct World {
    /// Handle to the runtime.
    pub handle: RuntimeHandle,
    /// Bridge the runtime drives.
    pub bridge: Arc<ScriptedBridge>,
    /// Config source the runtime fetches from.
    pub config_source: Arc<ScriptedConfigSource>,
    /// Identity store shared with the runtime.
    pub identity: IdentityStore,
    /// Clock the runtime reads.
    pub env: SimEnv,
    task: JoinHandle<()>,
}

impl World {
    /// Start building a world.
    pub fn builder() -> WorldBuilder {
        WorldBuilder::default()
    }

    /// Shut the runtime down and wait for it to exit.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        let _ = self.task.await;
    }
}

/// Builder for [`World`].
#[derive(Debug)]
pub struct WorldBuilder {
    bridge: ScriptedBridge,
    config_source: ScriptedConfigSource,
    token: Option<String>,
    persisted_tunnel: Option<String>,
    config: RuntimeConfig,
    seed: u64,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self {
            bridge: ScriptedBridge::new(),
            config_source: ScriptedConfigSource::new(),
            token: Some("header.payload.signature".to_string()),
            persisted_tunnel: None,
            config: RuntimeConfig::default(),
            seed: 0,
        }
    }
}

impl WorldBuilder {
    /// Use this bridge.
    #[must_use]
    pub fn bridge(mut self, bridge: ScriptedBridge) -> Self {
        self.bridge = bridge;
        self
    }

    /// Use this config source.
    #[must_use]
    pub fn config_source(mut self, config_source: ScriptedConfigSource) -> Self {
        self.config_source = config_source;
        self
    }

    /// Stored auth token; `None` means logged out.
    #[must_use]
    pub fn token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    /// Tunnel handle left by a previous process.
    #[must_use]
    pub fn persisted_tunnel(mut self, id: &str) -> Self {
        self.persisted_tunnel = Some(id.to_string());
        self
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// RNG seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Spawn the runtime. Must be called inside a tokio runtime.
    pub fn start(self) -> World {
        let identity = IdentityStore::new(Arc::new(MemoryStore::new()));
        if let Some(token) = &self.token {
            let user = waygate_store::StoredUser { username: "tester".to_string(), token_expiry: u64::MAX };
            if let Err(e) = identity.save_session(token, &user) {
                tracing::warn!(error = %e, "seed_session_failed");
            }
        }
        if let Some(id) = &self.persisted_tunnel {
            if let Err(e) = identity.set_tunnel_handle(id) {
                tracing::warn!(error = %e, "seed_tunnel_failed");
            }
            self.bridge.set_active(id);
        }

        let bridge = Arc::new(self.bridge);
        let config_source = Arc::new(self.config_source);
        let env = SimEnv::with_seed(self.seed);
        let services = Services {
            bridge: bridge.clone(),
            config_source: config_source.clone(),
            identity: identity.clone(),
        };
        let (handle, task) = waygate_app::spawn(services, self.config, env.clone());

        World { handle, bridge, config_source, identity, env, task }
    }
}
