//! Key-value backends for the descriptor store.
//!
//! A backend only has to provide point reads, ordered prefix scans and
//! atomic batch writes. [`MemoryBackend`] keeps everything in process memory
//! (tests, ephemeral deployments); [`RedbBackend`] persists to a redb file.
//!
//! A redb file is opened with an exclusive lock, so only one process can
//! use it at a time. Several processes sharing one store need a custom
//! backend over a shared database.

mod memory;
mod redb;

use std::fmt;

use thiserror::Error;

pub use self::memory::MemoryBackend;
pub use self::redb::RedbBackend;

/// Errors raised by a [`Backend`].
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: lock poisoned")]
    Poisoned,

    /// The database file is held open by another handle or process.
    #[error("kv: database is locked: {0}")]
    Locked(String),
}

/// Result type for backend operations.
pub type KVResult<T> = Result<T, KVError>;

/// Byte-valued key-value storage with string keys.
///
/// Implementations must be safe for concurrent use. A call that returns
/// `Ok` must be visible to every call issued after it on the same backend.
pub trait Backend: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Set a single key.
    fn set(&self, key: &str, value: &[u8]) -> KVResult<()>;

    /// Write all entries in one atomic step. Either every entry becomes
    /// visible or none does.
    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()>;

    /// Return all entries whose key starts with `prefix`, ordered by key.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;
}

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend {{ ... }}")
    }
}

pub(crate) fn storage_err<E: fmt::Display>(e: E) -> KVError {
    KVError::Storage(e.to_string())
}
