//! Durable store of face embeddings keyed by normalized identity.
//!
//! Each [`Identity`] holds one or more embeddings of a single, store-wide
//! dimension. Keys come from display names via [`normalize_key`], so
//! "Jane Doe" and "  jane   doe " are the same person. Writes are upserts:
//! re-enrolling a key replaces its embeddings.
//!
//! ```
//! use faceid_store::DescriptorStore;
//!
//! let store = DescriptorStore::in_memory();
//! store.put("Jane Doe", "Jane Doe", vec![vec![0.1, 0.2, 0.3]]).unwrap();
//! assert_eq!(store.get("  jane   doe ").unwrap().display_name, "Jane Doe");
//! ```
//!
//! Storage is pluggable through [`kv::Backend`]; [`kv::RedbBackend`] is the
//! persistent one.

mod error;
mod identity;
pub mod key;
pub mod kv;
mod store;

pub use error::StoreError;
pub use identity::{Embedding, Identity};
pub use key::{normalize_display_name, normalize_key};
pub use store::DescriptorStore;
