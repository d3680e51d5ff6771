//! CLI errors.

use thiserror::Error;
use waygate_api::ApiError;
use waygate_core::CommandError;
use waygate_store::StoreError;

/// Anything that stops a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// No state directory given and the platform has no config directory.
    #[error("no config directory available; pass --state-dir")]
    NoStateDir,

    /// Identity store failure.
    #[error("identity store: {0}")]
    Store(#[from] StoreError),

    /// Backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Connection action failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Terminal I/O failure.
    #[error("terminal: {0}")]
    Io(#[from] std::io::Error),
}
