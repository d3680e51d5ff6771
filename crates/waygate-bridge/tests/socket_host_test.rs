//! Native bridge over a Unix socket plugin host.
#![cfg(unix)]

use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::UnixListener,
    sync::mpsc,
};
use waygate_bridge::{
    BridgeError, NativeBridge, PluginError, PluginFrame, PluginHost, PluginRequest,
    SocketHostConfig, SocketPluginHost, TunnelBridge,
};
use waygate_core::{ErrorKind, StatusEvent, SystemEnv, TunnelStatus};
use waygate_store::{IdentityStore, MemoryStore};

/// Fake plugin: answers `isRunning` with true, rejects `stop`, acks the rest.
/// Each received request is reported on the returned channel; pushing a
/// payload on the returned sender emits a status frame.
fn spawn_plugin(listener: UnixListener) -> (mpsc::UnboundedReceiver<PluginRequest>, mpsc::UnboundedSender<Value>) {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            let frame = tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.unwrap() else { break };
                    let request: PluginRequest = serde_json::from_str(&line).unwrap();
                    let frame = match request.action.as_str() {
                        "isRunning" => PluginFrame::Reply { id: request.id, result: json!(true), error: None },
                        "stop" => PluginFrame::Reply { id: request.id, result: Value::Null, error: Some("tunnel busy".into()) },
                        _ => PluginFrame::Reply { id: request.id, result: Value::Null, error: None },
                    };
                    let _ = seen_tx.send(request);
                    frame
                }
                Some(payload) = push_rx.recv() => PluginFrame::Status { payload },
            };
            let mut line = serde_json::to_vec(&frame).unwrap();
            line.push(b'\n');
            writer.write_all(&line).await.unwrap();
        }
    });

    (seen_rx, push_tx)
}

#[tokio::test]
async fn native_bridge_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugin.sock");
    let (mut seen, push) = spawn_plugin(UnixListener::bind(&path).unwrap());

    let host = Arc::new(SocketPluginHost::connect(&path).await.unwrap());
    let identity = IdentityStore::new(Arc::new(MemoryStore::new()));
    let bridge = NativeBridge::connect(host, identity.clone(), SystemEnv).await;
    assert!(bridge.is_native());
    assert_eq!(seen.recv().await.unwrap().action, "onStatusChange");

    let mut sub = bridge.subscribe();

    let started = bridge.start("ss://abc", Some("Server-1")).await.unwrap();
    let request = seen.recv().await.unwrap();
    assert_eq!(request.action, "start");
    assert_eq!(request.args, vec![json!(started.tunnel_id), json!("Server-1"), json!("ss://abc")]);

    push.send(json!({"id": started.tunnel_id, "status": 0})).unwrap();
    assert_eq!(sub.recv().await, Some(StatusEvent::new(started.tunnel_id.clone(), TunnelStatus::Connected)));

    let running = bridge.is_running(None).await.unwrap();
    assert!(running.connected);
    assert_eq!(running.tunnel_id.as_deref(), Some(started.tunnel_id.as_str()));

    let err = bridge.stop(None).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Plugin(PluginError::Rejected { ref action, ref message })
            if action == "stop" && message == "tunnel busy"
    ));
    assert_eq!(identity.tunnel_handle().unwrap(), Some(started.tunnel_id));
}

#[tokio::test]
async fn missing_socket_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = SocketPluginHost::connect(dir.path().join("absent.sock")).await.unwrap_err();
    assert!(matches!(err, PluginError::Unavailable(_)));
}

/// Fake plugin that reads every request and never answers.
fn spawn_silent_plugin(listener: UnixListener) {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });
}

#[tokio::test]
async fn silent_plugin_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugin.sock");
    spawn_silent_plugin(UnixListener::bind(&path).unwrap());

    let config = SocketHostConfig { call_timeout: Duration::from_millis(100) };
    let host = Arc::new(SocketPluginHost::connect_with_config(&path, config).await.unwrap());

    let err = host.exec("isRunning", vec![json!("t1")]).await.unwrap_err();
    assert!(matches!(err, PluginError::TimedOut { ref action } if action == "isRunning"));

    let identity = IdentityStore::new(Arc::new(MemoryStore::new()));
    let bridge = NativeBridge::connect(host, identity, SystemEnv).await;

    let err = bridge.start("ss://abc", Some("Server-1")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Plugin(PluginError::TimedOut { ref action }) if action == "start"));
    assert_eq!(err.kind(), ErrorKind::BridgeFailure);

    let err = bridge.stop(Some("t1")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Plugin(PluginError::TimedOut { .. })));
}
