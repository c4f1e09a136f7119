use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A face embedding. Its length is fixed per store.
pub type Embedding = Vec<f32>;

/// A person known to the store.
///
/// `embeddings` is never empty for a stored identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Normalized identity key.
    pub key: String,

    /// Human-readable name, whitespace-collapsed.
    pub display_name: String,

    /// Embeddings captured at the last enrollment.
    pub embeddings: Vec<Embedding>,

    /// Time of the last successful upsert.
    pub enrolled_at: DateTime<Utc>,
}

impl Identity {
    /// Length of this identity's embeddings.
    pub fn dimension(&self) -> usize {
        self.embeddings.first().map_or(0, Vec::len)
    }
}
