use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use crate::error::StoreError;
use crate::identity::{Embedding, Identity};
use crate::key::{
    DIMENSION_KEY, IDENTITY_PREFIX, identity_key, normalize_display_name, normalize_key,
};
use crate::kv::{Backend, MemoryBackend};

/// Durable mapping from normalized identity key to [`Identity`].
///
/// The embedding dimension D is established by the first successful
/// [`put`](Self::put) and enforced on every later one. Writers are
/// serialized so that establishing D cannot race; reads go straight to the
/// backend.
///
/// Thread-safe: share it behind an `Arc`.
pub struct DescriptorStore {
    backend: Box<dyn Backend>,
    // Established dimension. The mutex doubles as the writer lock.
    dim: Mutex<Option<usize>>,
}

impl DescriptorStore {
    /// Open a store over an existing backend, loading the dimension marker
    /// if one was written before.
    pub fn open(backend: Box<dyn Backend>) -> Result<Self, StoreError> {
        let dim = match backend.get(DIMENSION_KEY)? {
            Some(raw) => {
                let text = String::from_utf8_lossy(&raw);
                let d = text.trim().parse::<usize>().map_err(|e| {
                    StoreError::Serialization(format!("bad dimension marker {text:?}: {e}"))
                })?;
                Some(d)
            }
            None => None,
        };
        debug!(?dim, "descriptor store opened");
        Ok(Self {
            backend,
            dim: Mutex::new(dim),
        })
    }

    /// Create an empty store over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            dim: Mutex::new(None),
        }
    }

    /// Returns the established embedding dimension, or `None` if nothing
    /// has been stored yet.
    pub fn dimension(&self) -> Result<Option<usize>, StoreError> {
        Ok(*self.lock_dim()?)
    }

    /// Insert or replace the identity for `key`.
    ///
    /// `key` is normalized before use. A previous record for the same key
    /// is overwritten, never merged. The record and the dimension marker
    /// are written in one atomic batch.
    pub fn put(
        &self,
        key: &str,
        display_name: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<Identity, StoreError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(StoreError::Validation("identity key is empty".into()));
        }
        if embeddings.is_empty() {
            return Err(StoreError::Validation(format!(
                "identity {key:?} has no embeddings"
            )));
        }
        let got = check_uniform(&embeddings)?;

        let mut dim = self.lock_dim()?;
        if let Some(expected) = *dim {
            if expected != got {
                return Err(StoreError::DimensionMismatch { expected, got });
            }
        }

        let mut display_name = normalize_display_name(display_name);
        if display_name.is_empty() {
            display_name = key.clone();
        }
        let identity = Identity {
            key,
            display_name,
            embeddings,
            enrolled_at: Utc::now(),
        };

        let record = serde_json::to_vec(&identity)?;
        let dim_value = got.to_string();
        let record_key = identity_key(&identity.key);
        self.backend.batch_set(&[
            (record_key.as_str(), record.as_slice()),
            (DIMENSION_KEY, dim_value.as_bytes()),
        ])?;
        *dim = Some(got);

        debug!(
            key = %identity.key,
            embeddings = identity.embeddings.len(),
            "identity stored"
        );
        Ok(identity)
    }

    /// Look up an identity. `key` is normalized first, so any spelling that
    /// normalizes to the stored key finds it.
    pub fn get(&self, key: &str) -> Result<Identity, StoreError> {
        let key = normalize_key(key);
        match self.backend.get(&identity_key(&key))? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(StoreError::NotFound(key)),
        }
    }

    /// Return every stored identity. Callers must not depend on the order.
    pub fn list(&self) -> Result<Vec<Identity>, StoreError> {
        self.backend
            .scan(IDENTITY_PREFIX)?
            .into_iter()
            .map(|(_, raw)| serde_json::from_slice(&raw).map_err(StoreError::from))
            .collect()
    }

    /// Number of stored identities.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.backend.scan(IDENTITY_PREFIX)?.len())
    }

    /// Returns true if no identity has been stored.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn lock_dim(&self) -> Result<MutexGuard<'_, Option<usize>>, StoreError> {
        self.dim
            .lock()
            .map_err(|_| StoreError::Unavailable("dimension lock poisoned".into()))
    }
}

/// Checks that every embedding is non-empty, finite and of one length.
/// Returns that length.
fn check_uniform(embeddings: &[Embedding]) -> Result<usize, StoreError> {
    let expected = embeddings[0].len();
    for emb in embeddings {
        if emb.is_empty() {
            return Err(StoreError::Validation("embedding is empty".into()));
        }
        if emb.len() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                got: emb.len(),
            });
        }
        if emb.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::Validation(
                "embedding contains a non-finite value".into(),
            ));
        }
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::RedbBackend;
    use std::path::Path;
    use tempfile::tempdir;

    fn open_redb(path: &Path) -> DescriptorStore {
        let kv = RedbBackend::open(path).unwrap();
        DescriptorStore::open(Box::new(kv)).unwrap()
    }

    #[test]
    fn put_then_get() {
        let store = DescriptorStore::in_memory();
        assert_eq!(store.dimension().unwrap(), None);

        let id = store
            .put("Alice", "Alice", vec![vec![1.0, 0.0, 0.0]])
            .unwrap();
        assert_eq!(id.key, "alice");
        assert_eq!(store.dimension().unwrap(), Some(3));

        let got = store.get("ALICE").unwrap();
        assert_eq!(got.display_name, "Alice");
        assert_eq!(got.embeddings, vec![vec![1.0, 0.0, 0.0]]);
    }

    #[test]
    fn get_missing() {
        let store = DescriptorStore::in_memory();
        assert!(matches!(store.get("nobody"), Err(StoreError::NotFound(k)) if k == "nobody"));
    }

    #[test]
    fn reenroll_replaces() {
        let store = DescriptorStore::in_memory();
        store
            .put("Jane Doe", "Jane Doe", vec![vec![1.0, 0.0], vec![0.9, 0.1]])
            .unwrap();
        store
            .put("  jane   doe ", "  jane   doe ", vec![vec![0.0, 1.0]])
            .unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, "jane doe");
        assert_eq!(all[0].display_name, "jane doe");
        assert_eq!(all[0].embeddings, vec![vec![0.0, 1.0]]);
    }

    #[test]
    fn same_put_twice_is_idempotent() {
        let store = DescriptorStore::in_memory();
        let emb = vec![vec![0.5, 0.5]];
        store.put("Bob", "Bob", emb.clone()).unwrap();
        store.put("Bob", "Bob", emb.clone()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("bob").unwrap().embeddings, emb);
    }

    #[test]
    fn rejects_blank_key() {
        let store = DescriptorStore::in_memory();
        let err = store.put("   ", "x", vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        let store = DescriptorStore::in_memory();
        assert!(matches!(
            store.put("a", "a", vec![]),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.put("a", "a", vec![vec![]]),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.put("a", "a", vec![vec![1.0, f32::NAN]]),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.dimension().unwrap(), None);
    }

    #[test]
    fn enforces_dimension() {
        let store = DescriptorStore::in_memory();
        store.put("a", "a", vec![vec![1.0, 2.0, 3.0]]).unwrap();

        let err = store.put("b", "b", vec![vec![1.0, 2.0]]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "store: dimension mismatch: expected 3, got 2"
        );

        let err = store
            .put("c", "c", vec![vec![1.0, 2.0, 3.0], vec![1.0]])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn blank_display_name_falls_back_to_key() {
        let store = DescriptorStore::in_memory();
        let id = store.put("Carol", "  ", vec![vec![1.0]]).unwrap();
        assert_eq!(id.display_name, "carol");
    }

    #[test]
    fn redb_reopen_keeps_records_and_dimension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.redb");
        {
            let store = open_redb(&path);
            store.put("Alice", "Alice", vec![vec![1.0, 0.0]]).unwrap();
        }

        let store = open_redb(&path);
        assert_eq!(store.dimension().unwrap(), Some(2));
        assert_eq!(store.get("alice").unwrap().display_name, "Alice");
        let wide = vec![vec![1.0, 0.0, 0.0]];
        let err = store.put("Bob", "Bob", wide).unwrap_err();
        assert_eq!(
            err.to_string(),
            "store: dimension mismatch: expected 2, got 3"
        );
    }

    #[test]
    fn corrupt_dimension_marker() {
        let kv = MemoryBackend::new();
        kv.set(DIMENSION_KEY, b"many").unwrap();
        assert!(matches!(
            DescriptorStore::open(Box::new(kv)),
            Err(StoreError::Serialization(_))
        ));
    }
}
