//! Waygate client core logic
//!
//! Pure state machine logic for the Waygate VPN client, completely decoupled
//! from I/O. The native tunnel plugin, the REST backend and durable storage
//! all live behind the runtime; this crate only decides what should happen.
//!
//! # Architecture
//!
//! The [`Reconciler`] owns the single [`ConnectionRecord`] of the process.
//! Three independent sources feed it: user actions, asynchronous status
//! pushes from the native layer, and periodic status polls. Every transition
//! takes the current time as a parameter and returns declarative
//! [`ReconcilerAction`]s (fetch a config, start a tunnel, persist a handle)
//! that a runtime executes and reports back as completion events.
//!
//! This keeps the reconciliation rules testable without a bridge, a network
//! or a clock, and lets the same code run under the production runtime and
//! the deterministic simulation harness.
//!
//! # Components
//!
//! - [`reconciler`]: Connection reconciliation state machine
//! - [`record`]: Connection record and its observable view
//! - [`tunnel`]: Native status codes, push events, bridge call outcomes
//! - [`descriptor`]: Access descriptor validation
//! - [`assignment`]: Server assignment returned by the config backend
//! - [`elapsed`]: Connected-duration arithmetic and formatting
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`error`]: Error taxonomy surfaced to the user

pub mod assignment;
pub mod descriptor;
pub mod elapsed;
pub mod env;
pub mod error;
pub mod reconciler;
pub mod record;
pub mod tunnel;

pub use assignment::ServerAssignment;
pub use descriptor::{AccessDescriptor, is_shadowsocks_url};
pub use elapsed::{elapsed_ms, format_hms};
pub use env::{Environment, SystemEnv};
pub use error::{CommandError, ConnectError, ErrorKind};
pub use reconciler::{Operation, Reconciler, ReconcilerAction};
pub use record::{ConnectionRecord, ConnectionStatus, ConnectionView};
pub use tunnel::{RunningState, StartOutcome, StatusEvent, StatusFamily, StopOutcome, TunnelStatus};
