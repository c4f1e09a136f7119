//! Face enrollment and recognition pipelines.
//!
//! # Architecture
//!
//! ```text
//! Enroller   -> DescriptorStore::put -> MatcherCache::invalidate
//! Recognizer -> MatcherCache::get_or_build -> Matcher::classify -> EventLog
//! ```
//!
//! Both pipelines share one [`MatcherCache`], which owns the store handle.
//! The cache keeps at most one matcher and a generation counter; a rebuild
//! that races with a write is returned to its caller but never cached.
//!
//! # Consistency
//!
//! Within one process a completed enrollment is visible to every later
//! recognition. A redb file can only be open in one process; with a custom
//! shared backend, processes sharing a store do not invalidate each other's
//! caches: their views converge only when a cache entry expires, see
//! [`CacheConfig::max_age`]. That window is accepted behavior.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use faceid_recognizer::{CacheConfig, Enroller, MatcherCache, Recognizer};
//! use faceid_store::DescriptorStore;
//!
//! let store = Arc::new(DescriptorStore::in_memory());
//! let cache = Arc::new(MatcherCache::new(store, CacheConfig::default()));
//! let enroller = Enroller::new(Arc::clone(&cache));
//! let recognizer = Recognizer::new(cache);
//!
//! enroller.enroll("Alice", vec![vec![1.0, 0.0, 0.0]]).unwrap();
//! let c = recognizer.recognize(&[1.0, 0.0, 0.0]).unwrap();
//! assert_eq!(c.label, "alice");
//! ```
//!
//! Images are turned into embeddings by an injected [`Extractor`]; the
//! pipelines never touch pixels themselves.

mod cache;
mod enroll;
mod error;
mod events;
mod extract;
mod recognize;

pub use cache::{CacheConfig, MatcherCache};
pub use enroll::{Enrolled, Enroller};
pub use error::FaceError;
pub use events::{DEFAULT_EVENT_CAPACITY, EventLog, RecognitionEvent};
pub use extract::{ExtractError, Extractor, HttpExtractor, decode_image};
pub use recognize::Recognizer;

pub use faceid_matcher::{Classification, UNKNOWN_LABEL};
