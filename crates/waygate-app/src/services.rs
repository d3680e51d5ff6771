use std::sync::Arc;

use waygate_api::ConfigSource;
use waygate_bridge::TunnelBridge;
use waygate_store::IdentityStore;

/// Collaborators injected into the runtime.
///
/// Built once by the composition root. Each service is a single shared
/// instance for the life of the process.
#[derive(Clone)]
pub struct Services {
    /// Native or simulated tunnel bridge.
    pub bridge: Arc<dyn TunnelBridge>,
    /// Server assignment source.
    pub config_source: Arc<dyn ConfigSource>,
    /// Durable auth token and tunnel handle.
    pub identity: IdentityStore,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("native", &self.bridge.is_native())
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
