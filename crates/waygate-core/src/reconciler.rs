//! Connection reconciliation state machine.
//!
//! Merges three weakly-synchronized signals into the single
//! [`ConnectionRecord`]: user actions, push events from the native layer, and
//! periodic running-state polls.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter and never touch I/O
//! - Methods return the [`ReconcilerAction`]s the runtime must execute
//! - The runtime feeds I/O results back through the `handle_*` methods
//!
//! # State Machine
//!
//! ```text
//!                 connect                 started
//! ┌──────────────┐──────>┌────────────┐──────────>┌───────────┐
//! │ Disconnected │       │ Connecting │           │ Connected │
//! └──────────────┘<──┐   └────────────┘           └───────────┘
//!        ^           │         │ fetch/validate/start   │
//!        │ dismiss   │         │ failure                │ unrecognized push
//!        │           │         v                        v
//!        │           │      ┌───────┐<──────────────────┘
//!        └───────────┼──────│ Error │
//!                    │      └───────┘
//!                    └── disconnect (from any state)
//! ```
//!
//! # In-flight lock
//!
//! At most one user action runs at a time. A connect holds the lock across
//! the config fetch and the bridge start, a disconnect across the bridge
//! stop. Requests made while the lock is held fail with
//! [`CommandError::Busy`]; completions for a phase that is no longer current
//! are dropped.
//!
//! # Tunnel-id tie-break
//!
//! Push events and poll results are applied only when they name the tunnel
//! the record holds, or when the record holds none (the event's id is then
//! adopted). Anything else belongs to a superseded tunnel and is discarded.
//!
//! # Start confirmation
//!
//! A successful start is provisional until the native layer confirms it with
//! a push (or a poll reports the tunnel running). Until then the bridge may
//! answer polls with "not running" while the tunnel comes up, so a
//! not-running poll never demotes an unconfirmed tunnel. Failures during
//! setup arrive as pushes.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    assignment::ServerAssignment,
    descriptor::AccessDescriptor,
    error::{CommandError, ConnectError},
    record::{ConnectionRecord, ConnectionStatus, ConnectionView},
    tunnel::{RunningState, StartOutcome, StatusEvent, StatusFamily, StopOutcome},
};

/// User-initiated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Bring a tunnel up.
    Connect,
    /// Tear the tunnel down.
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        })
    }
}

/// Side effects requested by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerAction {
    /// Fetch a fresh server assignment, then call
    /// [`Reconciler::handle_config_fetched`].
    FetchConfig,

    /// Ask the bridge to start a tunnel, then call
    /// [`Reconciler::handle_tunnel_started`].
    StartTunnel {
        /// Validated access descriptor.
        endpoint: AccessDescriptor,
        /// Name shown by the native layer.
        display_name: String,
    },

    /// Ask the bridge to stop a tunnel, then call
    /// [`Reconciler::handle_tunnel_stopped`].
    StopTunnel {
        /// Tunnel to stop; `None` lets the bridge fall back to the persisted
        /// handle.
        tunnel_id: Option<String>,
    },

    /// Ask the bridge whether a tunnel is running, then call
    /// [`Reconciler::handle_poll_result`] with the same id.
    QueryTunnel {
        /// Tunnel to query; `None` lets the bridge fall back to the persisted
        /// handle.
        tunnel_id: Option<String>,
    },

    /// Write the tunnel handle to the identity store.
    PersistTunnel {
        /// Handle to persist.
        tunnel_id: String,
    },

    /// Remove the tunnel handle from the identity store.
    ForgetTunnel,

    /// The user action finished; release whoever is waiting on it.
    Complete {
        /// Operation that finished.
        operation: Operation,
        /// How it ended.
        outcome: Result<(), ConnectError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    FetchingConfig,
    StartingTunnel,
    StoppingTunnel,
}

impl Phase {
    fn operation(self) -> Operation {
        match self {
            Self::FetchingConfig | Self::StartingTunnel => Operation::Connect,
            Self::StoppingTunnel => Operation::Disconnect,
        }
    }
}

/// Connection reconciliation state machine.
///
/// Pure: no I/O, no stored clock. Owns the one [`ConnectionRecord`] of the
/// process.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    record: ConnectionRecord,
    in_flight: Option<Phase>,
    unconfirmed: Option<String>,
}

impl Reconciler {
    /// Create a reconciler in `Disconnected`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record.
    #[must_use]
    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    /// User action holding the in-flight lock, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight.map(Phase::operation)
    }

    /// Whether a user action is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Tunnel started by the last connect that the native layer has not yet
    /// confirmed.
    #[must_use]
    pub fn awaiting_confirmation(&self) -> Option<&str> {
        self.unconfirmed.as_deref()
    }

    /// Snapshot for observers.
    #[must_use]
    pub fn view(&self) -> ConnectionView {
        ConnectionView { record: self.record.clone(), in_flight: self.in_flight() }
    }

    /// Begin a connect.
    ///
    /// # Errors
    ///
    /// - `Busy` if another user action is in flight
    /// - `InvalidTransition` unless the status is `Disconnected` or `Error`
    pub fn request_connect(&mut self) -> Result<Vec<ReconcilerAction>, CommandError> {
        self.ensure_idle()?;

        match self.record.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {},
            status => {
                return Err(CommandError::InvalidTransition { operation: Operation::Connect, status });
            },
        }

        self.record.status = ConnectionStatus::Connecting;
        self.record.last_error = None;
        self.record.connected_at_ms = None;
        self.in_flight = Some(Phase::FetchingConfig);
        self.unconfirmed = None;

        info!("connect_requested");
        Ok(vec![ReconcilerAction::FetchConfig])
    }

    /// Begin a disconnect. Legal from any status.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if another user action is in flight.
    pub fn request_disconnect(&mut self) -> Result<Vec<ReconcilerAction>, CommandError> {
        self.ensure_idle()?;

        self.in_flight = Some(Phase::StoppingTunnel);

        info!(tunnel_id = ?self.record.tunnel_id, "disconnect_requested");
        Ok(vec![ReconcilerAction::StopTunnel { tunnel_id: self.record.tunnel_id.clone() }])
    }

    /// Disconnect when connected or connecting, otherwise connect.
    ///
    /// # Errors
    ///
    /// See [`Self::request_connect`] and [`Self::request_disconnect`].
    pub fn request_toggle(&mut self) -> Result<Vec<ReconcilerAction>, CommandError> {
        match self.record.status {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                self.request_disconnect()
            },
            ConnectionStatus::Disconnected | ConnectionStatus::Error => self.request_connect(),
        }
    }

    /// Clear the error message, demoting `Error` to `Disconnected`.
    ///
    /// Never starts a reconnect.
    pub fn dismiss_error(&mut self) {
        self.record.last_error = None;
        if self.record.status == ConnectionStatus::Error {
            self.record.status = ConnectionStatus::Disconnected;
            self.record.connected_at_ms = None;
            if !self.is_busy() {
                self.record.tunnel_id = None;
            }
        }
    }

    /// Config fetch finished.
    pub fn handle_config_fetched(
        &mut self,
        result: Result<ServerAssignment, ConnectError>,
    ) -> Vec<ReconcilerAction> {
        if self.in_flight != Some(Phase::FetchingConfig) {
            debug!("config_result_out_of_phase");
            return Vec::new();
        }

        let assignment = match result {
            Ok(assignment) => assignment,
            Err(err) => return self.fail(err),
        };

        let endpoint = match AccessDescriptor::parse(&assignment.access_url) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(server = %assignment.server_name, "access_descriptor_rejected");
                return self.fail(err);
            },
        };

        self.record.server_name = Some(assignment.server_name.clone());
        self.record.access_endpoint = Some(assignment.access_url);
        self.in_flight = Some(Phase::StartingTunnel);

        debug!(server = %assignment.server_name, server_id = assignment.server_id, "config_fetched");
        vec![ReconcilerAction::StartTunnel { endpoint, display_name: assignment.server_name }]
    }

    /// Bridge start finished.
    pub fn handle_tunnel_started(
        &mut self,
        result: Result<StartOutcome, ConnectError>,
        now_ms: u64,
    ) -> Vec<ReconcilerAction> {
        if self.in_flight != Some(Phase::StartingTunnel) {
            debug!("start_result_out_of_phase");
            return Vec::new();
        }

        let outcome = match result {
            Ok(outcome) if outcome.tunnel_id.is_empty() => {
                return self.fail(ConnectError::bridge("Native layer returned no tunnel id"));
            },
            Ok(outcome) => outcome,
            Err(err) => return self.fail(err),
        };

        // A push may already have confirmed this tunnel while start ran.
        let confirmed = self.record.status == ConnectionStatus::Connected
            && self.record.tunnel_id.as_deref() == Some(outcome.tunnel_id.as_str());

        self.enter_connected(now_ms);
        self.record.tunnel_id = Some(outcome.tunnel_id.clone());
        self.in_flight = None;
        self.unconfirmed = (!confirmed).then(|| outcome.tunnel_id.clone());

        info!(tunnel_id = %outcome.tunnel_id, provisional = %outcome.status, "tunnel_started");
        vec![
            ReconcilerAction::PersistTunnel { tunnel_id: outcome.tunnel_id },
            ReconcilerAction::Complete { operation: Operation::Connect, outcome: Ok(()) },
        ]
    }

    /// Bridge stop finished.
    ///
    /// A failed stop is logged and otherwise treated as success: the record
    /// always reaches `Disconnected`.
    pub fn handle_tunnel_stopped(
        &mut self,
        result: Result<StopOutcome, ConnectError>,
    ) -> Vec<ReconcilerAction> {
        if self.in_flight != Some(Phase::StoppingTunnel) {
            debug!("stop_result_out_of_phase");
            return Vec::new();
        }

        match result {
            Ok(outcome) => info!(tunnel_id = %outcome.tunnel_id, "tunnel_stopped"),
            Err(err) => warn!(error = %err, "tunnel_stop_failed"),
        }

        self.record.status = ConnectionStatus::Disconnected;
        self.record.tunnel_id = None;
        self.record.connected_at_ms = None;
        self.record.access_endpoint = None;
        self.record.last_error = None;
        self.in_flight = None;
        self.unconfirmed = None;

        vec![
            ReconcilerAction::ForgetTunnel,
            ReconcilerAction::Complete { operation: Operation::Disconnect, outcome: Ok(()) },
        ]
    }

    /// Apply a push event from the native layer.
    ///
    /// Returns whether the record changed.
    pub fn apply_status_event(&mut self, event: &StatusEvent, now_ms: u64) -> bool {
        if event.tunnel_id.is_empty() {
            debug!("status_event_without_id");
            return false;
        }

        let holds_match = match &self.record.tunnel_id {
            Some(current) if *current != event.tunnel_id => {
                debug!(current = %current, event = %event.tunnel_id, "stale_status_event");
                return false;
            },
            Some(_) => true,
            None => false,
        };

        let before = self.record.clone();
        self.unconfirmed = None;

        match event.status.family() {
            StatusFamily::Connected => {
                self.enter_connected(now_ms);
                self.record.tunnel_id = Some(event.tunnel_id.clone());
            },
            StatusFamily::Connecting => {
                self.record.status = ConnectionStatus::Connecting;
                self.record.connected_at_ms = None;
                self.record.tunnel_id = Some(event.tunnel_id.clone());
            },
            StatusFamily::Disconnected => {
                self.record.status = ConnectionStatus::Disconnected;
                self.record.connected_at_ms = None;
                self.record.tunnel_id = None;
            },
            StatusFamily::Unrecognized(code) => {
                if !holds_match {
                    debug!(event = %event.tunnel_id, code, "unrecognized_status_not_adopted");
                    return false;
                }
                warn!(tunnel_id = %event.tunnel_id, code, "unrecognized_tunnel_status");
                self.record.status = ConnectionStatus::Error;
                self.record.connected_at_ms = None;
                self.record.last_error = Some(ConnectError::bridge(format!(
                    "Tunnel reported unrecognized status {code}"
                )));
                return self.record != before;
            },
        }

        self.record.last_error = None;
        debug!(tunnel_id = %event.tunnel_id, status = %event.status, "status_event_applied");
        self.record != before
    }

    /// Start a poll cycle. Nothing is polled while a user action is in flight.
    pub fn poll(&self) -> Vec<ReconcilerAction> {
        if self.is_busy() {
            return Vec::new();
        }
        vec![ReconcilerAction::QueryTunnel { tunnel_id: self.record.tunnel_id.clone() }]
    }

    /// Apply the answer to a [`ReconcilerAction::QueryTunnel`].
    ///
    /// `queried` is the id the query was issued for. Answers that arrive
    /// after the record moved on to another tunnel, or while a user action is
    /// in flight, are dropped. Returns whether the record changed.
    pub fn handle_poll_result(
        &mut self,
        queried: Option<&str>,
        result: Result<RunningState, ConnectError>,
        now_ms: u64,
    ) -> bool {
        if self.is_busy() || queried != self.record.tunnel_id.as_deref() {
            debug!("poll_result_superseded");
            return false;
        }

        let state = match result {
            Ok(state) => state,
            Err(err) => {
                debug!(error = %err, "poll_failed");
                return false;
            },
        };

        if state.connected && self.unconfirmed.take().is_some() {
            debug!(tunnel_id = ?self.record.tunnel_id, "tunnel_confirmed_by_poll");
        }

        match (self.record.status, state.connected, state.tunnel_id) {
            (ConnectionStatus::Connected, false, _) if self.unconfirmed.is_some() => {
                debug!(tunnel_id = ?self.record.tunnel_id, "tunnel_not_yet_running");
                false
            },
            (ConnectionStatus::Connected, false, _) => {
                info!(tunnel_id = ?self.record.tunnel_id, "tunnel_lost");
                self.record.status = ConnectionStatus::Disconnected;
                self.record.connected_at_ms = None;
                self.record.tunnel_id = None;
                true
            },
            (ConnectionStatus::Disconnected, true, Some(running)) if self.record.tunnel_id.is_none() => {
                info!(tunnel_id = %running, "tunnel_restored");
                self.enter_connected(now_ms);
                self.record.tunnel_id = Some(running);
                self.record.last_error = None;
                true
            },
            _ => false,
        }
    }

    fn ensure_idle(&self) -> Result<(), CommandError> {
        if self.is_busy() {
            debug!(in_flight = ?self.in_flight, "request_rejected_busy");
            return Err(CommandError::Busy);
        }
        Ok(())
    }

    fn enter_connected(&mut self, now_ms: u64) {
        if self.record.status != ConnectionStatus::Connected {
            self.record.connected_at_ms = Some(now_ms);
        }
        self.record.status = ConnectionStatus::Connected;
    }

    fn fail(&mut self, err: ConnectError) -> Vec<ReconcilerAction> {
        let operation = self.in_flight.map_or(Operation::Connect, Phase::operation);
        warn!(kind = ?err.kind, error = %err, "connect_failed");

        self.record.status = ConnectionStatus::Error;
        self.record.connected_at_ms = None;
        self.record.last_error = Some(err.clone());
        self.in_flight = None;
        self.unconfirmed = None;

        vec![ReconcilerAction::Complete { operation, outcome: Err(err) }]
    }
}
