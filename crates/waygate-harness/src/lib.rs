//! Deterministic test harness for Waygate.
//!
//! Scripted implementations of the bridge and config source seams, an
//! [`waygate_core::Environment`] on tokio's pausable clock, and a reference
//! model of the connection state machine for model-based property tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod scripted;
pub mod sim_env;

pub use model::{ModelConnection, ModelReject, Operation};
pub use scenario::{World, WorldBuilder};
pub use scripted::{ScriptedBridge, ScriptedConfigSource};
pub use sim_env::SimEnv;
