//! Persistent identity store.
//!
//! Durable string key-value storage for the values that must survive a
//! process restart: the auth token, the stored user record, the token expiry
//! and the active tunnel handle. Every value is a single string with no
//! schema versioning.
//!
//! [`KeyValueStore`] is the storage seam. [`FileStore`] persists to a JSON
//! file with atomic replace, [`MemoryStore`] backs tests and simulation, and
//! [`IdentityStore`] is the typed facade the rest of the client uses.

pub mod error;
pub mod file;
pub mod identity;
pub mod keys;
pub mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use identity::{IdentityStore, StoredUser};
pub use memory::MemoryStore;

/// Durable string key-value storage.
///
/// Calls are synchronous and side-effecting. Implementations must be safe to
/// share between tasks; there is a single logical writer.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
