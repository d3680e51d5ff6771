//! Bridge backed by the native tunnel plugin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use waygate_core::{
    AccessDescriptor, Environment, RunningState, StartOutcome, StatusEvent, StatusFamily,
    StopOutcome, TunnelStatus,
};
use waygate_store::IdentityStore;

use crate::{
    BridgeError, TunnelBridge,
    hub::{StatusHub, Subscription},
    mint_handle,
    plugin::{PluginHost, action},
    resolve_tunnel_id,
};

/// Name shown by the native layer when the caller gives none.
pub const DEFAULT_DISPLAY_NAME: &str = "Waygate Server";

/// [`TunnelBridge`] over a [`PluginHost`].
pub struct NativeBridge<E: Environment> {
    host: Arc<dyn PluginHost>,
    identity: IdentityStore,
    hub: Arc<StatusHub>,
    env: E,
}

impl<E: Environment> std::fmt::Debug for NativeBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBridge").finish_non_exhaustive()
    }
}

impl<E: Environment> NativeBridge<E> {
    /// Create the bridge and register the long-lived status callback.
    ///
    /// A failed registration is logged; calls still work, pushes do not.
    pub async fn connect(host: Arc<dyn PluginHost>, identity: IdentityStore, env: E) -> Self {
        let hub = StatusHub::new();
        match host.status_stream().await {
            Ok(payloads) => {
                tokio::spawn(pump_status(payloads, identity.clone(), Arc::clone(&hub)));
            },
            Err(e) => tracing::warn!(error = %e, "status_callback_registration_failed"),
        }
        Self { host, identity, hub, env }
    }
}

#[async_trait]
impl<E: Environment> TunnelBridge for NativeBridge<E> {
    async fn start(&self, endpoint: &str, display_name: Option<&str>) -> Result<StartOutcome, BridgeError> {
        let endpoint =
            AccessDescriptor::parse(endpoint).map_err(|e| BridgeError::InvalidConfig(e.message))?;
        let minted = self.identity.tunnel_handle()?.is_none();
        let tunnel_id = self.identity.ensure_tunnel_handle(|| mint_handle(&self.env))?;
        let name = display_name.unwrap_or(DEFAULT_DISPLAY_NAME);

        let started = self
            .host
            .exec(action::START, vec![json!(tunnel_id), json!(name), json!(endpoint.as_str())])
            .await;
        if let Err(e) = started {
            // A handle minted for this call names no tunnel.
            if minted {
                self.clear_active_tunnel();
            }
            return Err(e.into());
        }

        tracing::info!(tunnel_id = %tunnel_id, server = name, "native_start_requested");
        Ok(StartOutcome {
            status: TunnelStatus::Connecting,
            tunnel_id,
            server: display_name.unwrap_or_default().to_string(),
        })
    }

    async fn stop(&self, tunnel_id: Option<&str>) -> Result<StopOutcome, BridgeError> {
        let Some(id) = resolve_tunnel_id(tunnel_id, &self.identity)? else {
            tracing::debug!("native_stop_without_tunnel");
            return Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: String::new() });
        };

        self.host.exec(action::STOP, vec![json!(id)]).await?;
        self.identity.clear_tunnel_handle()?;

        tracing::info!(tunnel_id = %id, "native_stopped");
        Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: id })
    }

    async fn is_running(&self, tunnel_id: Option<&str>) -> Result<RunningState, BridgeError> {
        let Some(id) = resolve_tunnel_id(tunnel_id, &self.identity)? else {
            return Ok(RunningState::default());
        };

        let running = self.host.exec(action::IS_RUNNING, vec![json!(id)]).await?;
        let connected = running.as_bool().unwrap_or(false);
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
        true
    }
}

/// Decode raw plugin payloads, keep the persisted handle current and forward
/// events to the hub.
async fn pump_status(mut payloads: mpsc::UnboundedReceiver<Value>, identity: IdentityStore, hub: Arc<StatusHub>) {
    while let Some(payload) = payloads.recv().await {
        let Some(event) = decode_status(&payload, &identity) else {
            tracing::warn!(payload = %payload, "status_payload_malformed");
            continue;
        };

        let live = matches!(event.status.family(), StatusFamily::Connected | StatusFamily::Connecting);
        if live && !event.tunnel_id.is_empty() {
            identity
                .set_tunnel_handle(&event.tunnel_id)
                .unwrap_or_else(|e| tracing::warn!(error = %e, "tunnel_handle_save_failed"));
        }

        hub.publish(event);
    }
    tracing::info!("native_status_stream_closed");
}

/// `{id, status}` to an event. A missing status code is unrecognized; a
/// missing id falls back to the persisted handle.
fn decode_status(payload: &Value, identity: &IdentityStore) -> Option<StatusEvent> {
    let object = payload.as_object()?;
    let code = object.get("status").and_then(Value::as_i64).unwrap_or(-1);
    let tunnel_id = match object.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => identity.tunnel_handle().ok().flatten().unwrap_or_default(),
    };
    Some(StatusEvent::new(tunnel_id, TunnelStatus::from_code(code)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use waygate_core::SystemEnv;
    use waygate_store::MemoryStore;

    use super::*;
    use crate::PluginError;

    #[derive(Default)]
    struct FakeHost {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        status_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
        reject: Mutex<Option<String>>,
        running: Mutex<Value>,
    }

    impl FakeHost {
        fn calls(&self) -> Vec<(String, Vec<Value>)> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, payload: Value) {
            self.status_tx.lock().unwrap().as_ref().unwrap().send(payload).unwrap();
        }
    }

    #[async_trait]
    impl PluginHost for FakeHost {
        async fn exec(&self, name: &str, args: Vec<Value>) -> Result<Value, PluginError> {
            self.calls.lock().unwrap().push((name.to_string(), args));
            if let Some(message) = self.reject.lock().unwrap().clone() {
                return Err(PluginError::Rejected { action: name.to_string(), message });
            }
            Ok(if name == action::IS_RUNNING { self.running.lock().unwrap().clone() } else { Value::Null })
        }

        async fn status_stream(&self) -> Result<mpsc::UnboundedReceiver<Value>, PluginError> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.status_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    async fn bridge() -> (Arc<FakeHost>, IdentityStore, NativeBridge<SystemEnv>) {
        let host = Arc::new(FakeHost::default());
        let identity = IdentityStore::new(Arc::new(MemoryStore::new()));
        let bridge = NativeBridge::connect(host.clone(), identity.clone(), SystemEnv).await;
        (host, identity, bridge)
    }

    #[tokio::test]
    async fn start_mints_handle_and_passes_positional_args() {
        let (host, identity, bridge) = bridge().await;

        let outcome = bridge.start("ss://abc", Some("Server-1")).await.unwrap();
        assert_eq!(outcome.status, TunnelStatus::Connecting);
        assert!(outcome.tunnel_id.starts_with("tg-"));
        assert_eq!(outcome.server, "Server-1");
        assert_eq!(identity.tunnel_handle().unwrap(), Some(outcome.tunnel_id.clone()));

        let again = bridge.start("ss://abc", None).await.unwrap();
        assert_eq!(again.tunnel_id, outcome.tunnel_id);

        let calls = host.calls();
        assert_eq!(calls[0], (
            action::START.to_string(),
            vec![json!(outcome.tunnel_id), json!("Server-1"), json!("ss://abc")]
        ));
        assert_eq!(calls[1].1[1], json!(DEFAULT_DISPLAY_NAME));
    }

    #[tokio::test]
    async fn rejected_start_forgets_freshly_minted_handle() {
        let (host, identity, bridge) = bridge().await;
        *host.reject.lock().unwrap() = Some("permission denied".to_string());

        let err = bridge.start("ss://abc", Some("Server-1")).await.unwrap_err();
        assert_eq!(err.to_string(), "start rejected by plugin: permission denied");
        assert_eq!(identity.tunnel_handle().unwrap(), None);

        identity.set_tunnel_handle("tg-old").unwrap();
        bridge.start("ss://abc", None).await.unwrap_err();
        assert_eq!(identity.tunnel_handle().unwrap().as_deref(), Some("tg-old"));
    }

    #[tokio::test]
    async fn start_rejects_bad_descriptor_without_calling_plugin() {
        let (host, _, bridge) = bridge().await;
        let err = bridge.start("http://bad", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
        assert_eq!(err.kind(), waygate_core::ErrorKind::InvalidConfig);
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_without_tunnel_is_noop() {
        let (host, _, bridge) = bridge().await;
        let outcome = bridge.stop(None).await.unwrap();
        assert_eq!(outcome, StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: String::new() });
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_uses_persisted_handle_and_clears_it() {
        let (host, identity, bridge) = bridge().await;
        identity.set_tunnel_handle("tg-old").unwrap();

        let outcome = bridge.stop(None).await.unwrap();
        assert_eq!(outcome.tunnel_id, "tg-old");
        assert_eq!(host.calls(), vec![(action::STOP.to_string(), vec![json!("tg-old")])]);
        assert_eq!(bridge.active_tunnel_id(), None);
    }

    #[tokio::test]
    async fn stop_failure_keeps_handle() {
        let (host, identity, bridge) = bridge().await;
        identity.set_tunnel_handle("tg-old").unwrap();
        *host.reject.lock().unwrap() = Some("plugin unreachable".to_string());

        let err = bridge.stop(None).await.unwrap_err();
        assert_eq!(err.to_string(), "stop rejected by plugin: plugin unreachable");
        assert_eq!(bridge.active_tunnel_id().as_deref(), Some("tg-old"));
    }

    #[tokio::test]
    async fn is_running_reports_id_only_when_up() {
        let (host, identity, bridge) = bridge().await;
        assert_eq!(bridge.is_running(None).await.unwrap(), RunningState::default());

        identity.set_tunnel_handle("tg-1").unwrap();
        *host.running.lock().unwrap() = json!(true);
        assert_eq!(bridge.is_running(None).await.unwrap(), RunningState {
            connected: true,
            tunnel_id: Some("tg-1".to_string())
        });

        *host.running.lock().unwrap() = json!(false);
        assert_eq!(bridge.is_running(Some("tg-1")).await.unwrap(), RunningState::default());
    }

    #[tokio::test]
    async fn pushes_are_decoded_and_tracked() {
        let (host, identity, bridge) = bridge().await;
        let mut sub = bridge.subscribe();

        host.push(json!({"id": "t1", "status": 2}));
        assert_eq!(sub.recv().await, Some(StatusEvent::new("t1", TunnelStatus::Reconnecting)));
        assert_eq!(identity.tunnel_handle().unwrap().as_deref(), Some("t1"));

        host.push(json!("garbage"));
        host.push(json!({"id": "t1", "status": 1}));
        assert_eq!(sub.recv().await, Some(StatusEvent::new("t1", TunnelStatus::Disconnected)));
        assert_eq!(identity.tunnel_handle().unwrap().as_deref(), Some("t1"));

        host.push(json!({"status": 9}));
        assert_eq!(sub.recv().await, Some(StatusEvent::new("t1", TunnelStatus::Unrecognized(9))));
    }
}
