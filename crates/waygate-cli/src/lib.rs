//! Command-line front end for Waygate.
//!
//! A thin shell over [`waygate_app::RuntimeHandle`]: argument handling,
//! interactive command parsing and text rendering of the connection view.
//! All reconciliation happens in the runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod error;
pub mod logging;
pub mod render;
pub mod setup;

pub use commands::Command;
pub use error::CliError;
pub use setup::Settings;
