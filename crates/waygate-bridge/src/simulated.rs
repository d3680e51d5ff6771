//! Local stand-in for the native plugin.
//!
//! Timing mirrors the plugin as seen from the reconciler: `start` returns a
//! provisional `Connecting` outcome at once and a single `connected` push
//! follows after a fixed delay; `stop` completes immediately.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use waygate_core::{
    AccessDescriptor, Environment, RunningState, StartOutcome, StatusEvent, StopOutcome,
    TunnelStatus,
};
use waygate_store::IdentityStore;

use crate::{
    BridgeError, TunnelBridge,
    hub::{StatusHub, Subscription},
    mint_handle, resolve_tunnel_id,
};

/// Simulation timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Delay between `start` returning and the `connected` push.
    pub connect_push_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { connect_push_delay: Duration::from_millis(300) }
    }
}

#[derive(Debug, Default)]
struct SimState {
    running: HashSet<String>,
    /// Tunnel id to the generation of its outstanding start.
    pending: HashMap<String, u64>,
    generation: u64,
}

/// [`TunnelBridge`] that fakes tunnels in memory.
pub struct SimulatedBridge<E: Environment> {
    identity: IdentityStore,
    hub: Arc<StatusHub>,
    state: Arc<Mutex<SimState>>,
    config: SimulationConfig,
    env: E,
}

impl<E: Environment> std::fmt::Debug for SimulatedBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBridge").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<E: Environment> SimulatedBridge<E> {
    /// Create a simulated bridge.
    pub fn new(identity: IdentityStore, config: SimulationConfig, env: E) -> Self {
        Self {
            identity,
            hub: StatusHub::new(),
            state: Arc::new(Mutex::new(SimState::default())),
            config,
            env,
        }
    }

    /// Tunnels currently up.
    pub fn running_tunnels(&self) -> Vec<String> {
        let mut running: Vec<String> = lock(&self.state).running.iter().cloned().collect();
        running.sort();
        running
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl<E: Environment> TunnelBridge for SimulatedBridge<E> {
    async fn start(&self, endpoint: &str, display_name: Option<&str>) -> Result<StartOutcome, BridgeError> {
        AccessDescriptor::parse(endpoint).map_err(|e| BridgeError::InvalidConfig(e.message))?;
        let tunnel_id = self.identity.ensure_tunnel_handle(|| mint_handle(&self.env))?;

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            let generation = state.generation;
            state.pending.insert(tunnel_id.clone(), generation);
            generation
        };

        let state = Arc::clone(&self.state);
        let hub = Arc::clone(&self.hub);
        let env = self.env.clone();
        let delay = self.config.connect_push_delay;
        let id = tunnel_id.clone();
        tokio::spawn(async move {
            env.sleep(delay).await;
            {
                let mut state = lock(&state);
                if state.pending.get(&id) != Some(&generation) {
                    tracing::debug!(tunnel_id = %id, "simulated_connect_cancelled");
                    return;
                }
                state.pending.remove(&id);
                state.running.insert(id.clone());
            }
            tracing::debug!(tunnel_id = %id, "simulated_tunnel_up");
            hub.publish(StatusEvent::new(id, TunnelStatus::Connected));
        });

        tracing::info!(tunnel_id = %tunnel_id, "simulated_start_requested");
        Ok(StartOutcome {
            status: TunnelStatus::Connecting,
            tunnel_id,
            server: display_name.unwrap_or("Simulated Server").to_string(),
        })
    }

    async fn stop(&self, tunnel_id: Option<&str>) -> Result<StopOutcome, BridgeError> {
        let Some(id) = resolve_tunnel_id(tunnel_id, &self.identity)? else {
            return Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: String::new() });
        };

        {
            let mut state = lock(&self.state);
            state.pending.remove(&id);
            state.running.remove(&id);
        }
        self.identity.clear_tunnel_handle()?;

        tracing::info!(tunnel_id = %id, "simulated_stopped");
        Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: id })
    }

    async fn is_running(&self, tunnel_id: Option<&str>) -> Result<RunningState, BridgeError> {
        let Some(id) = resolve_tunnel_id(tunnel_id, &self.identity)? else {
            return Ok(RunningState::default());
        };
        let connected = lock(&self.state).running.contains(&id);
        Ok(RunningState { connected, tunnel_id: connected.then_some(id) })
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn active_tunnel_id(&self) -> Option<String> {
        self.identity.tunnel_handle().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "tunnel_handle_read_failed");
            None
        })
    }

    fn clear_active_tunnel(&self) {
        if let Err(e) = self.identity.clear_tunnel_handle() {
            tracing::warn!(error = %e, "tunnel_handle_clear_failed");
        }
    }

    fn is_native(&self) -> bool {
        false
    }
}
