use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use super::{Backend, KVError, KVResult};

/// In-memory [`Backend`] over an ordered map. Data is lost on drop.
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| KVError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        let mut data = self.data.write().map_err(|_| KVError::Poisoned)?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        // One write guard for the whole batch keeps it atomic for readers.
        let mut data = self.data.write().map_err(|_| KVError::Poisoned)?;
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self.data.read().map_err(|_| KVError::Poisoned)?;
        let bounds = (Bound::Included(prefix), Bound::Unbounded);
        Ok(data
            .range::<str, _>(bounds)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set() {
        let kv = MemoryBackend::new();
        assert_eq!(kv.get("face:id:alice").unwrap(), None);

        kv.set("face:id:alice", b"v1").unwrap();
        kv.set("face:id:alice", b"v2").unwrap();
        assert_eq!(kv.get("face:id:alice").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn scan_is_prefix_bounded_and_ordered() {
        let kv = MemoryBackend::new();
        kv.set("face:id:bob", b"2").unwrap();
        kv.set("face:id:alice", b"1").unwrap();
        kv.set("face:meta:dim", b"128").unwrap();
        kv.set("face:idx", b"x").unwrap();

        let keys: Vec<String> = kv
            .scan("face:id:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["face:id:alice", "face:id:bob"]);
    }

    #[test]
    fn clones_share_data() {
        let kv = MemoryBackend::new();
        let other = kv.clone();
        kv.batch_set(&[("a", b"1"), ("b", b"2")]).unwrap();
        assert_eq!(other.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(other.scan("").unwrap().len(), 2);
    }
}
