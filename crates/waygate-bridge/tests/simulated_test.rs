//! Simulated bridge timing, under paused tokio time.

use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, timeout};
use waygate_bridge::{SimulatedBridge, SimulationConfig, TunnelBridge};
use waygate_core::{RunningState, StatusEvent, SystemEnv, TunnelStatus};
use waygate_store::{IdentityStore, MemoryStore};

fn bridge() -> (SimulatedBridge<SystemEnv>, IdentityStore) {
    let identity = IdentityStore::new(Arc::new(MemoryStore::new()));
    (SimulatedBridge::new(identity.clone(), SimulationConfig::default(), SystemEnv), identity)
}

#[tokio::test(start_paused = true)]
async fn start_pushes_connected_after_delay() {
    let (bridge, identity) = bridge();
    let mut sub = bridge.subscribe();
    let begin = Instant::now();

    let outcome = bridge.start("ss://abc", Some("Server-1")).await.unwrap();
    assert_eq!(outcome.status, TunnelStatus::Connecting);
    assert_eq!(identity.tunnel_handle().unwrap(), Some(outcome.tunnel_id.clone()));
    assert!(!bridge.is_running(None).await.unwrap().connected);

    let event = sub.recv().await.unwrap();
    assert_eq!(event, StatusEvent::new(outcome.tunnel_id.clone(), TunnelStatus::Connected));
    let waited = begin.elapsed();
    assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(400));

    assert_eq!(bridge.is_running(None).await.unwrap(), RunningState {
        connected: true,
        tunnel_id: Some(outcome.tunnel_id.clone())
    });
    assert!(!bridge.is_native());

    // Exactly one push.
    assert!(timeout(Duration::from_secs(5), sub.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn stop_before_push_cancels_it() {
    let (bridge, _) = bridge();
    let mut sub = bridge.subscribe();

    let outcome = bridge.start("ss://abc", None).await.unwrap();
    let stopped = bridge.stop(Some(&outcome.tunnel_id)).await.unwrap();
    assert_eq!(stopped.tunnel_id, outcome.tunnel_id);

    assert!(timeout(Duration::from_secs(1), sub.recv()).await.is_err());
    assert!(bridge.running_tunnels().is_empty());
    assert_eq!(bridge.active_tunnel_id(), None);
}

#[tokio::test(start_paused = true)]
async fn stop_with_nothing_known_returns_empty_id() {
    let (bridge, _) = bridge();
    let outcome = bridge.stop(None).await.unwrap();
    assert_eq!(outcome.status, TunnelStatus::Disconnected);
    assert_eq!(outcome.tunnel_id, "");
}

#[tokio::test(start_paused = true)]
async fn invalid_descriptor_is_rejected_up_front() {
    let (bridge, identity) = bridge();
    let err = bridge.start("http://bad", None).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid access key format from server");
    assert_eq!(identity.tunnel_handle().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn restart_reuses_handle() {
    let (bridge, _) = bridge();
    let first = bridge.start("ss://abc", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = bridge.start("ss://abc", None).await.unwrap();
    assert_eq!(first.tunnel_id, second.tunnel_id);

    bridge.clear_active_tunnel();
    let third = bridge.start("ss://abc", None).await.unwrap();
    assert_ne!(third.tunnel_id, first.tunnel_id);
}
