use thiserror::Error;

use crate::kv::KVError;

/// Errors returned by [`DescriptorStore`](crate::DescriptorStore) operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store: invalid record: {0}")]
    Validation(String),

    #[error("store: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("store: identity not found: {0}")]
    NotFound(String),

    #[error("store: unavailable: {0}")]
    Unavailable(String),

    #[error("store: serialization error: {0}")]
    Serialization(String),
}

impl From<KVError> for StoreError {
    fn from(e: KVError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
