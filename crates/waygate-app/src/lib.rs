//! Connection runtime for Waygate.
//!
//! Wires the pure [`waygate_core::Reconciler`] to real I/O. One task owns the
//! reconciler and serializes every source of change onto it:
//!
//! - user commands from any number of [`RuntimeHandle`]s
//! - push events from the bridge subscription
//! - a fixed-interval running-state poll
//! - completions of the I/O the reconciler asked for
//!
//! I/O runs on spawned tasks and reports back as a completion, so push events
//! keep flowing while a connect is waiting on the network. Observers read the
//! single [`waygate_core::ConnectionView`] through a `watch` channel.
//!
//! # Components
//!
//! - [`Services`]: the injected bridge, config source and identity store
//! - [`Runtime`]: the event loop
//! - [`RuntimeHandle`]: cheap, cloneable command and observation handle

mod config;
mod handle;
mod runtime;
mod services;

pub use config::RuntimeConfig;
pub use handle::RuntimeHandle;
pub use runtime::{Runtime, spawn};
pub use services::Services;
