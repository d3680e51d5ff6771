//! Reference model of the connection state machine.
//!
//! A deliberately flat restatement of the reconciliation rules: no actions,
//! no I/O, just the fields an observer can see. Model-based tests drive it
//! and the real [`waygate_core::Reconciler`] with the same [`Operation`]
//! sequence and compare the two after every step.

use waygate_core::{ConnectionStatus, ErrorKind};

/// One step of a generated scenario.
///
/// Tunnel numbers are folded into a handful of ids (`t0`..`t3`) so pushes
/// and polls regularly hit the held tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// User connect.
    Connect,
    /// User disconnect.
    Disconnect,
    /// User toggle.
    Toggle,
    /// User dismisses the error.
    Dismiss,
    /// Config fetch succeeds with a valid or invalid descriptor.
    ConfigOk {
        /// Descriptor passes the scheme check.
        valid: bool,
    },
    /// Config fetch times out.
    ConfigErr,
    /// Bridge start succeeds.
    StartOk {
        /// Tunnel number.
        tunnel: u8,
    },
    /// Bridge start is rejected.
    StartErr,
    /// Bridge stop succeeds.
    StopOk,
    /// Bridge stop is rejected.
    StopErr,
    /// Push event from the native layer.
    Push {
        /// Tunnel number.
        tunnel: u8,
        /// Wire status code.
        code: i8,
    },
    /// A poll cycle answered by the bridge.
    Poll {
        /// Whether the bridge reports a running tunnel.
        running: bool,
        /// Running tunnel number, used when nothing is held.
        tunnel: u8,
    },
    /// Wall clock moves forward.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// Tunnel id for a generated tunnel number.
pub fn tunnel_name(tunnel: u8) -> String {
    format!("t{}", tunnel % 4)
}

/// Why the model refused a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelReject {
    /// Another user action holds the lock.
    Busy,
    /// Not legal from the current status.
    InvalidTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Fetch,
    Start,
    Stop,
}

/// Observable connection state as the model predicts it.
#[derive(Debug, Clone)]
pub struct ModelConnection {
    /// Logical status.
    pub status: ConnectionStatus,
    /// Held tunnel.
    pub tunnel: Option<String>,
    /// Stamp of the last entry into `Connected`.
    pub connected_at_ms: Option<u64>,
    /// Kind of the displayed error.
    pub error: Option<ErrorKind>,
    /// Started tunnel the native layer has not confirmed yet.
    pub awaiting: Option<String>,
    /// Model clock.
    pub now_ms: u64,
    step: Option<Step>,
}

impl ModelConnection {
    /// Disconnected, idle, clock at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            tunnel: None,
            connected_at_ms: None,
            error: None,
            awaiting: None,
            now_ms,
            step: None,
        }
    }

    /// A user action is in flight.
    pub fn is_busy(&self) -> bool {
        self.step.is_some()
    }

    /// Apply one operation. Only user actions can be refused.
    pub fn apply(&mut self, op: Operation) -> Result<(), ModelReject> {
        match op {
            Operation::Connect => self.connect(),
            Operation::Disconnect => self.disconnect(),
            Operation::Toggle => match self.status {
                ConnectionStatus::Connected | ConnectionStatus::Connecting => self.disconnect(),
                ConnectionStatus::Disconnected | ConnectionStatus::Error => self.connect(),
            },
            Operation::Dismiss => {
                self.error = None;
                if self.status == ConnectionStatus::Error {
                    self.status = ConnectionStatus::Disconnected;
                    self.connected_at_ms = None;
                    if self.step.is_none() {
                        self.tunnel = None;
                    }
                }
                Ok(())
            },
            Operation::ConfigOk { valid } => {
                if self.step == Some(Step::Fetch) {
                    if valid {
                        self.step = Some(Step::Start);
                    } else {
                        self.fail(ErrorKind::InvalidConfig);
                    }
                }
                Ok(())
            },
            Operation::ConfigErr => {
                if self.step == Some(Step::Fetch) {
                    self.fail(ErrorKind::Timeout);
                }
                Ok(())
            },
            Operation::StartOk { tunnel } => {
                if self.step == Some(Step::Start) {
                    let id = tunnel_name(tunnel);
                    let pushed = self.status == ConnectionStatus::Connected
                        && self.tunnel.as_deref() == Some(id.as_str());
                    self.stamp_connected();
                    self.tunnel = Some(id.clone());
                    self.awaiting = if pushed { None } else { Some(id) };
                    self.step = None;
                }
                Ok(())
            },
            Operation::StartErr => {
                if self.step == Some(Step::Start) {
                    self.fail(ErrorKind::BridgeFailure);
                }
                Ok(())
            },
            Operation::StopOk | Operation::StopErr => {
                if self.step == Some(Step::Stop) {
                    self.status = ConnectionStatus::Disconnected;
                    self.tunnel = None;
                    self.connected_at_ms = None;
                    self.error = None;
                    self.awaiting = None;
                    self.step = None;
                }
                Ok(())
            },
            Operation::Push { tunnel, code } => {
                self.push(&tunnel_name(tunnel), code);
                Ok(())
            },
            Operation::Poll { running, tunnel } => {
                self.poll(running, &tunnel_name(tunnel));
                Ok(())
            },
            Operation::AdvanceTime { millis } => {
                self.now_ms += u64::from(millis);
                Ok(())
            },
        }
    }

    fn connect(&mut self) -> Result<(), ModelReject> {
        if self.is_busy() {
            return Err(ModelReject::Busy);
        }
        if matches!(self.status, ConnectionStatus::Connected | ConnectionStatus::Connecting) {
            return Err(ModelReject::InvalidTransition);
        }
        self.status = ConnectionStatus::Connecting;
        self.error = None;
        self.connected_at_ms = None;
        self.awaiting = None;
        self.step = Some(Step::Fetch);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ModelReject> {
        if self.is_busy() {
            return Err(ModelReject::Busy);
        }
        self.step = Some(Step::Stop);
        Ok(())
    }

    fn push(&mut self, id: &str, code: i8) {
        let held = match self.tunnel.as_deref() {
            Some(current) if current != id => return,
            Some(_) => true,
            None => false,
        };
        self.awaiting = None;
        match code {
            0 => {
                self.stamp_connected();
                self.tunnel = Some(id.to_string());
                self.error = None;
            },
            2 => {
                self.status = ConnectionStatus::Connecting;
                self.connected_at_ms = None;
                self.tunnel = Some(id.to_string());
                self.error = None;
            },
            1 | 3 => {
                self.status = ConnectionStatus::Disconnected;
                self.connected_at_ms = None;
                self.tunnel = None;
                self.error = None;
            },
            _ if held => {
                self.status = ConnectionStatus::Error;
                self.connected_at_ms = None;
                self.error = Some(ErrorKind::BridgeFailure);
            },
            _ => {},
        }
    }

    fn poll(&mut self, running: bool, id: &str) {
        if self.is_busy() {
            return;
        }
        if running {
            self.awaiting = None;
        }
        match self.status {
            // Not running yet is expected until the start is confirmed.
            ConnectionStatus::Connected if !running && self.awaiting.is_none() => {
                self.status = ConnectionStatus::Disconnected;
                self.connected_at_ms = None;
                self.tunnel = None;
            },
            ConnectionStatus::Disconnected if running && self.tunnel.is_none() => {
                self.stamp_connected();
                self.tunnel = Some(id.to_string());
                self.error = None;
            },
            _ => {},
        }
    }

    fn stamp_connected(&mut self) {
        if self.status != ConnectionStatus::Connected {
            self.connected_at_ms = Some(self.now_ms);
        }
        self.status = ConnectionStatus::Connected;
    }

    fn fail(&mut self, kind: ErrorKind) {
        self.status = ConnectionStatus::Error;
        self.connected_at_ms = None;
        self.error = Some(kind);
        self.awaiting = None;
        self.step = None;
    }
}
