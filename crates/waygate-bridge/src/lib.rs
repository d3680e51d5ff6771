//! Native bridge adapter.
//!
//! [`TunnelBridge`] is the capability set the reconciler drives: start, stop,
//! query, and subscribe to status pushes. Two implementations exist and the
//! composition root picks exactly one at startup:
//!
//! - [`NativeBridge`] forwards to the externally-owned tunnel plugin through
//!   a [`PluginHost`]
//! - [`SimulatedBridge`] reproduces the plugin's observable timing locally
//!
//! Both validate the access descriptor before anything reaches the plugin,
//! both treat a stop with no known tunnel as a successful no-op, and both
//! maintain the persisted tunnel handle in the identity store.

pub mod error;
pub mod hub;
pub mod native;
pub mod plugin;
pub mod simulated;
#[cfg(unix)]
pub mod socket;

use async_trait::async_trait;
pub use error::{BridgeError, PluginError};
pub use hub::{StatusHub, Subscription};
pub use native::NativeBridge;
pub use plugin::{PluginFrame, PluginHost, PluginRequest};
pub use simulated::{SimulatedBridge, SimulationConfig};
#[cfg(unix)]
pub use socket::{SocketHostConfig, SocketPluginHost};
use waygate_core::{RunningState, StartOutcome, StopOutcome};

/// Capability set of the native tunnel layer.
#[async_trait]
pub trait TunnelBridge: Send + Sync {
    /// Request a tunnel to `endpoint`.
    ///
    /// Returns as soon as the request is accepted with a provisional
    /// `Connecting` outcome; the final status arrives as a push event.
    async fn start(&self, endpoint: &str, display_name: Option<&str>) -> Result<StartOutcome, BridgeError>;

    /// Stop `tunnel_id`, or the persisted tunnel when `None`.
    ///
    /// With no resolvable tunnel this succeeds with an empty id.
    async fn stop(&self, tunnel_id: Option<&str>) -> Result<StopOutcome, BridgeError>;

    /// Whether `tunnel_id`, or the persisted tunnel when `None`, is up.
    async fn is_running(&self, tunnel_id: Option<&str>) -> Result<RunningState, BridgeError>;

    /// Subscribe to status pushes. A new subscription replaces the previous
    /// one.
    fn subscribe(&self) -> Subscription;

    /// The persisted tunnel handle.
    fn active_tunnel_id(&self) -> Option<String>;

    /// Forget the persisted tunnel handle.
    fn clear_active_tunnel(&self);

    /// Whether this is the native variant.
    fn is_native(&self) -> bool;
}

/// Resolve an explicit id, falling back to the persisted one.
pub(crate) fn resolve_tunnel_id(
    explicit: Option<&str>,
    identity: &waygate_store::IdentityStore,
) -> Result<Option<String>, BridgeError> {
    match explicit.filter(|id| !id.is_empty()) {
        Some(id) => Ok(Some(id.to_string())),
        None => Ok(identity.tunnel_handle()?),
    }
}

/// Mint a fresh handle from the environment's clock and randomness.
pub(crate) fn mint_handle<E: waygate_core::Environment>(env: &E) -> String {
    let mut random = [0u8; 6];
    env.random_bytes(&mut random);
    waygate_core::tunnel::mint_tunnel_id(env.now_ms(), random)
}
