use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use faceid_matcher::{DEFAULT_THRESHOLD, Matcher};
use faceid_store::DescriptorStore;
use tracing::{debug, warn};

use crate::error::FaceError;

/// Controls [`MatcherCache`] behavior.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum Euclidean distance for a match. Default: 0.6.
    pub threshold: f32,

    /// Rebuild a cached matcher once it is older than this.
    ///
    /// Within one process every write invalidates the cache, so this only
    /// matters when other processes write to the same store: it bounds how
    /// long this process may classify against their old data. `None` keeps
    /// a matcher until the next local write.
    ///
    /// The bundled redb backend locks its file to a single process, so
    /// sharing a store across processes needs a custom
    /// [`Backend`](faceid_store::kv::Backend) over a shared database.
    pub max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_age: None,
        }
    }
}

struct Cached {
    matcher: Arc<Matcher>,
    built_at: Instant,
}

struct CacheState {
    generation: u64,
    cached: Option<Cached>,
}

/// Process-wide cache of the most recent [`Matcher`] for one store.
///
/// Every store write must be followed by [`invalidate`](Self::invalidate),
/// which bumps a generation counter. A rebuild remembers the generation it
/// started under and only commits if the counter has not moved since, so a
/// slow rebuild can never overwrite a newer invalidation with stale data.
///
/// Readers get an `Arc<Matcher>`; classifications already running keep
/// their snapshot when the cache is invalidated underneath them.
pub struct MatcherCache {
    store: Arc<DescriptorStore>,
    cfg: CacheConfig,
    state: Mutex<CacheState>,
}

impl MatcherCache {
    pub fn new(store: Arc<DescriptorStore>, cfg: CacheConfig) -> Self {
        Self {
            store,
            cfg,
            state: Mutex::new(CacheState {
                generation: 0,
                cached: None,
            }),
        }
    }

    /// The store this cache reads from.
    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    /// Distance threshold used for every built matcher.
    pub fn threshold(&self) -> f32 {
        self.cfg.threshold
    }

    /// Drop the cached matcher and start a new generation.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.cached = None;
        debug!(generation = state.generation, "matcher cache invalidated");
    }

    /// Current generation. Increases by one per invalidation.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Returns true if a fresh matcher is cached.
    pub fn is_cached(&self) -> bool {
        self.fresh(&self.lock()).is_some()
    }

    /// Return the cached matcher, building one from the store if there is
    /// none or it has expired.
    ///
    /// The store is read without holding the cache lock. If the store
    /// cannot be read the error is returned and the cache stays empty.
    pub fn get_or_build(&self) -> Result<Arc<Matcher>, FaceError> {
        let generation = {
            let state = self.lock();
            if let Some(m) = self.fresh(&state) {
                return Ok(m);
            }
            state.generation
        };

        let identities = self.store.list()?;
        let matcher = Arc::new(Matcher::build(&identities, self.cfg.threshold));
        debug!(
            generation,
            identities = identities.len(),
            vectors = matcher.len(),
            "matcher built"
        );

        self.commit(generation, Arc::clone(&matcher));
        Ok(matcher)
    }

    /// Store `matcher` if the cache is still at `generation`.
    /// Returns false if the build was discarded as stale.
    fn commit(&self, generation: u64, matcher: Arc<Matcher>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            warn!(
                built = generation,
                current = state.generation,
                "discarding matcher built from a stale snapshot"
            );
            return false;
        }
        state.cached = Some(Cached {
            matcher,
            built_at: Instant::now(),
        });
        true
    }

    fn fresh(&self, state: &CacheState) -> Option<Arc<Matcher>> {
        let cached = state.cached.as_ref()?;
        if let Some(max_age) = self.cfg.max_age {
            if cached.built_at.elapsed() > max_age {
                return None;
            }
        }
        Some(Arc::clone(&cached.matcher))
    }

    // The guarded state is only ever assigned whole, so a poisoned lock
    // still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use faceid_store::kv::{Backend, KVError, KVResult, MemoryBackend};

    fn cache_over(store: DescriptorStore) -> MatcherCache {
        MatcherCache::new(Arc::new(store), CacheConfig::default())
    }

    #[test]
    fn builds_once_until_invalidated() {
        let cache = cache_over(DescriptorStore::in_memory());
        assert!(!cache.is_cached());

        let m1 = cache.get_or_build().unwrap();
        assert!(m1.is_empty());
        assert!(cache.is_cached());

        let m2 = cache.get_or_build().unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));

        cache.invalidate();
        assert!(!cache.is_cached());
        assert_eq!(cache.generation(), 1);
        let m3 = cache.get_or_build().unwrap();
        assert!(!Arc::ptr_eq(&m1, &m3));
    }

    #[test]
    fn rebuild_reflects_writes_before_invalidate() {
        let cache = cache_over(DescriptorStore::in_memory());
        assert!(cache.get_or_build().unwrap().is_empty());

        cache
            .store()
            .put("Alice", "Alice", vec![vec![1.0, 0.0, 0.0]])
            .unwrap();
        cache.invalidate();

        let m = cache.get_or_build().unwrap();
        assert_eq!(m.classify(&[1.0, 0.0, 0.0]).unwrap().label, "alice");
    }

    #[test]
    fn held_snapshot_survives_invalidation() {
        let cache = cache_over(DescriptorStore::in_memory());
        cache.store().put("a", "a", vec![vec![0.0, 0.0]]).unwrap();
        let held = cache.get_or_build().unwrap();

        cache.store().put("b", "b", vec![vec![5.0, 5.0]]).unwrap();
        cache.invalidate();

        assert_eq!(held.len(), 1);
        assert_eq!(held.classify(&[5.0, 5.0]).unwrap().label, "unknown");
        assert_eq!(cache.get_or_build().unwrap().len(), 2);
    }

    #[test]
    fn stale_commit_is_discarded() {
        let cache = cache_over(DescriptorStore::in_memory());
        let started = cache.generation();
        let stale = Arc::new(Matcher::empty(cache.threshold()));

        cache.invalidate();
        assert!(!cache.commit(started, stale));
        assert!(!cache.is_cached());

        let current = cache.generation();
        assert!(cache.commit(current, Arc::new(Matcher::empty(0.6))));
        assert!(cache.is_cached());
    }

    #[test]
    fn max_age_expires_entry() {
        let cache = MatcherCache::new(
            Arc::new(DescriptorStore::in_memory()),
            CacheConfig {
                threshold: 0.6,
                max_age: Some(Duration::from_millis(20)),
            },
        );
        let m1 = cache.get_or_build().unwrap();
        assert!(cache.is_cached());
        thread::sleep(Duration::from_millis(40));
        assert!(!cache.is_cached());
        let m2 = cache.get_or_build().unwrap();
        assert!(!Arc::ptr_eq(&m1, &m2));
    }

    struct Gate {
        armed: AtomicBool,
        read_done: Barrier,
        release: Barrier,
    }

    /// Backend whose next scan pauses after reading, so a write and an
    /// invalidation can slip in between the read and the commit.
    struct GatedBackend {
        inner: MemoryBackend,
        gate: Arc<Gate>,
    }

    impl Backend for GatedBackend {
        fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
            self.inner.set(key, value)
        }

        fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
            self.inner.batch_set(entries)
        }

        fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
            let result = self.inner.scan(prefix);
            if self.gate.armed.swap(false, Ordering::SeqCst) {
                self.gate.read_done.wait();
                self.gate.release.wait();
            }
            result
        }
    }

    #[test]
    fn racing_rebuild_does_not_commit_stale_snapshot() {
        let gate = Arc::new(Gate {
            armed: AtomicBool::new(false),
            read_done: Barrier::new(2),
            release: Barrier::new(2),
        });
        let backend = GatedBackend {
            inner: MemoryBackend::new(),
            gate: Arc::clone(&gate),
        };
        let store = DescriptorStore::open(Box::new(backend)).unwrap();
        let cache = Arc::new(cache_over(store));
        let store = Arc::clone(cache.store());
        store.put("old", "old", vec![vec![0.0, 0.0]]).unwrap();
        cache.invalidate();

        gate.armed.store(true, Ordering::SeqCst);
        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_or_build().unwrap())
        };

        // The reader has listed the store but not committed yet.
        gate.read_done.wait();
        store.put("new", "new", vec![vec![9.0, 9.0]]).unwrap();
        cache.invalidate();
        gate.release.wait();

        let stale = reader.join().unwrap();
        assert_eq!(stale.len(), 1);
        assert!(!cache.is_cached(), "stale build must not be committed");

        let fresh = cache.get_or_build().unwrap();
        assert_eq!(fresh.classify(&[9.0, 9.0]).unwrap().label, "new");
    }

    struct DownBackend;

    impl Backend for DownBackend {
        fn get(&self, _key: &str) -> KVResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &[u8]) -> KVResult<()> {
            Err(KVError::Storage("connection refused".into()))
        }

        fn batch_set(&self, _entries: &[(&str, &[u8])]) -> KVResult<()> {
            Err(KVError::Storage("connection refused".into()))
        }

        fn scan(&self, _prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
            Err(KVError::Storage("connection refused".into()))
        }
    }

    #[test]
    fn unavailable_store_leaves_cache_empty() {
        let store = DescriptorStore::open(Box::new(DownBackend)).unwrap();
        let cache = cache_over(store);
        for _ in 0..3 {
            assert!(matches!(
                cache.get_or_build(),
                Err(FaceError::StoreUnavailable(_))
            ));
        }
        assert!(!cache.is_cached());
    }
}
