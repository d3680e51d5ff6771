//! Plugin host seam and its JSON-lines wire format.
//!
//! The native tunnel plugin is externally owned. It is invoked by action name
//! with positional arguments:
//!
//! | action           | args                          | result                 |
//! |------------------|-------------------------------|------------------------|
//! | `start`          | tunnel id, name, access URL   | none                   |
//! | `stop`           | tunnel id                     | none                   |
//! | `isRunning`      | tunnel id                     | bool                   |
//! | `onStatusChange` | none                          | stream of `{id, status}` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::PluginError;

/// Plugin actions.
pub mod action {
    /// Bring a tunnel up.
    pub const START: &str = "start";
    /// Tear a tunnel down.
    pub const STOP: &str = "stop";
    /// Query whether a tunnel is up.
    pub const IS_RUNNING: &str = "isRunning";
    /// Register the long-lived status callback.
    pub const ON_STATUS_CHANGE: &str = "onStatusChange";
}

/// Execution shim for the native plugin.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Run `action` and wait for its result.
    async fn exec(&self, action: &str, args: Vec<Value>) -> Result<Value, PluginError>;

    /// Register the status callback and return the raw payload stream.
    ///
    /// Called once per host. Payloads are `{id, status}` objects.
    async fn status_stream(&self) -> Result<mpsc::UnboundedReceiver<Value>, PluginError>;
}

/// Client to host: run an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Correlates the reply.
    pub id: u64,
    /// Plugin action name.
    pub action: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

/// Host to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginFrame {
    /// Outcome of a request.
    Reply {
        /// Request id.
        id: u64,
        /// Result value on success.
        #[serde(default)]
        result: Value,
        /// Failure reason; present means the action failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unsolicited status notification.
    Status {
        /// `{id, status}` payload.
        payload: Value,
    },
}
