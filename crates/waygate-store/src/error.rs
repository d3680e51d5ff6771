//! Store errors.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors from durable storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        /// What was being attempted.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Store file exists but is not a JSON string map.
    #[error("store file {} is corrupt: {source}", path.display())]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be decoded.
    #[error("stored value for {key} is invalid: {reason}")]
    InvalidValue {
        /// Storage key.
        key: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}
