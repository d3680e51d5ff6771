//! [`PluginHost`] over a Unix socket speaking JSON lines.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        UnixStream,
        unix::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{mpsc, oneshot},
    time::timeout,
};

use crate::{
    error::PluginError,
    plugin::{PluginFrame, PluginHost, PluginRequest, action},
};

type Pending = HashMap<u64, (String, oneshot::Sender<Result<Value, PluginError>>)>;

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    status_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_tx(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Value>>> {
        self.status_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Socket host settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketHostConfig {
    /// How long a call waits for its reply before failing.
    pub call_timeout: Duration,
}

impl Default for SocketHostConfig {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(10) }
    }
}

/// Plugin host reached through a Unix domain socket.
///
/// Requests and frames are newline-delimited JSON. A background task reads
/// frames, completes outstanding calls and forwards status payloads.
pub struct SocketPluginHost {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    config: SocketHostConfig,
}

impl std::fmt::Debug for SocketPluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPluginHost").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SocketPluginHost {
    /// Connect to the plugin host listening at `path` with default settings.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        Self::connect_with_config(path, SocketHostConfig::default()).await
    }

    /// Connect to the plugin host listening at `path`.
    pub async fn connect_with_config(
        path: impl AsRef<Path>,
        config: SocketHostConfig,
    ) -> Result<Self, PluginError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;
        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared::default());

        tokio::spawn(read_frames(reader, Arc::clone(&shared)));
        tracing::info!(socket = %path.display(), "plugin_host_connected");

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_id: AtomicU64::new(1),
            config,
        })
    }

    async fn send(&self, action: &str, args: Vec<Value>) -> Result<Value, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = PluginRequest { id, action: action.to_string(), args };
        let mut line =
            serde_json::to_vec(&request).map_err(|e| PluginError::Protocol(e.to_string()))?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id, (action.to_string(), tx));

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&line).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.shared.pending().remove(&id);
            return Err(e.into());
        }

        tracing::debug!(id, action, "plugin_request_sent");
        match timeout(self.config.call_timeout, rx).await {
            Ok(reply) => reply.map_err(|_| PluginError::Closed)?,
            Err(_) => {
                self.shared.pending().remove(&id);
                tracing::warn!(id, action, timeout = ?self.config.call_timeout, "plugin_call_timed_out");
                Err(PluginError::TimedOut { action: action.to_string() })
            },
        }
    }
}

#[async_trait]
impl PluginHost for SocketPluginHost {
    async fn exec(&self, action: &str, args: Vec<Value>) -> Result<Value, PluginError> {
        self.send(action, args).await
    }

    async fn status_stream(&self) -> Result<mpsc::UnboundedReceiver<Value>, PluginError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.status_tx() = Some(tx);
        if let Err(e) = self.send(action::ON_STATUS_CHANGE, Vec::new()).await {
            *self.shared.status_tx() = None;
            return Err(e);
        }
        Ok(rx)
    }
}

async fn read_frames(reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "plugin_host_read_failed");
                break;
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<PluginFrame>(&line) {
            Ok(PluginFrame::Reply { id, result, error }) => {
                let Some((action, tx)) = shared.pending().remove(&id) else {
                    tracing::debug!(id, "plugin_reply_unmatched");
                    continue;
                };
                let outcome = match error {
                    Some(message) => Err(PluginError::Rejected { action, message }),
                    None => Ok(result),
                };
                let _ = tx.send(outcome);
            },
            Ok(PluginFrame::Status { payload }) => {
                let mut status_tx = shared.status_tx();
                let delivered = status_tx.as_ref().is_some_and(|tx| tx.send(payload).is_ok());
                if !delivered {
                    tracing::debug!("plugin_status_unobserved");
                    *status_tx = None;
                }
            },
            Err(e) => tracing::warn!(error = %e, "plugin_frame_malformed"),
        }
    }

    tracing::warn!("plugin_host_disconnected");
    shared.pending().clear();
    *shared.status_tx() = None;
}
