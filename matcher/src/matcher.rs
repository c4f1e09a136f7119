use std::fmt;

use faceid_store::{Embedding, Identity};
use tracing::warn;

use crate::error::MatchError;
use crate::euclidean::euclidean_distance;

/// Label returned when no enrolled face is within the threshold.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Default maximum Euclidean distance for a match.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// One labeled vector compared against a query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// Identity key of the labeled vector.
    pub key: String,

    /// Euclidean distance to the query. Lower is more similar.
    pub distance: f32,
}

/// Result of [`Matcher::classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Matched identity key, or [`UNKNOWN_LABEL`].
    pub label: String,

    /// Distance to the nearest labeled vector, `f32::INFINITY` when the
    /// matcher is empty.
    pub distance: f32,
}

impl Classification {
    /// The classification for a query with nothing to compare against.
    pub fn no_candidates() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance: f32::INFINITY,
        }
    }

    /// Returns true if the query matched an enrolled identity.
    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

struct Entry {
    key: String,
    vector: Embedding,
}

/// Immutable nearest-neighbor classifier over a snapshot of identities.
///
/// Every stored embedding becomes one labeled entry, so an identity with
/// several embeddings matches on whichever of them is closest. The matcher
/// never changes after [`build`](Self::build); a changed store needs a new
/// matcher.
pub struct Matcher {
    entries: Vec<Entry>,
    dim: Option<usize>,
    threshold: f32,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("entries", &self.entries.len())
            .field("dim", &self.dim)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Matcher {
    /// Build a matcher from identities. Entries keep the identities' order,
    /// then each identity's embedding order.
    pub fn build(identities: &[Identity], threshold: f32) -> Self {
        Self::from_pairs(
            identities
                .iter()
                .flat_map(|id| id.embeddings.iter().map(|e| (id.key.clone(), e.clone()))),
            threshold,
        )
    }

    /// Build a matcher from `(key, embedding)` pairs.
    ///
    /// The first pair fixes the dimension; pairs of any other length are
    /// dropped with a warning.
    pub fn from_pairs<I>(pairs: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = (String, Embedding)>,
    {
        let mut entries: Vec<Entry> = Vec::new();
        let mut dim: Option<usize> = None;
        for (key, vector) in pairs {
            let d = *dim.get_or_insert(vector.len());
            if vector.len() != d {
                let got = vector.len();
                warn!(%key, expected = d, got, "skipping embedding of wrong dimension");
                continue;
            }
            entries.push(Entry { key, vector });
        }
        Self {
            entries,
            dim,
            threshold,
        }
    }

    /// An empty matcher: every query is unknown.
    pub fn empty(threshold: f32) -> Self {
        Self {
            entries: Vec::new(),
            dim: None,
            threshold,
        }
    }

    /// Dimension of the labeled vectors, `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    /// Maximum distance that still counts as a match.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of labeled vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the matcher holds no labeled vectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the closest labeled vector, or `None` when empty.
    ///
    /// Ties go to the first entry in build order.
    pub fn nearest(&self, query: &[f32]) -> Result<Option<MatchCandidate>, MatchError> {
        let Some(expected) = self.dim else {
            return Ok(None);
        };
        if query.len() != expected {
            return Err(MatchError::DimensionMismatch {
                expected,
                got: query.len(),
            });
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = euclidean_distance(query, &entry.vector);
            // Strict comparison keeps the first of equal minima.
            if best_idx.is_none() || d < best_dist {
                best_dist = d;
                best_idx = Some(i);
            }
        }

        Ok(best_idx.map(|i| MatchCandidate {
            key: self.entries[i].key.clone(),
            distance: best_dist,
        }))
    }

    /// Classify a query embedding.
    ///
    /// Returns the nearest identity key if its distance is `<=` the
    /// threshold, otherwise [`UNKNOWN_LABEL`] with the nearest distance.
    /// An empty matcher returns `unknown` at infinite distance.
    pub fn classify(&self, query: &[f32]) -> Result<Classification, MatchError> {
        let Some(best) = self.nearest(query)? else {
            return Ok(Classification::no_candidates());
        };
        let label = if best.distance <= self.threshold {
            best.key
        } else {
            UNKNOWN_LABEL.to_string()
        };
        Ok(Classification {
            label,
            distance: best.distance,
        })
    }
}
