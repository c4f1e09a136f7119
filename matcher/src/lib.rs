//! Nearest-neighbor face classification over a snapshot of enrolled identities.
//!
//! A [`Matcher`] flattens identities into labeled vectors and classifies a
//! query by Euclidean distance:
//!
//! 1. find the nearest labeled vector (first one wins on ties)
//! 2. `distance <= threshold` -> that vector's identity key
//! 3. otherwise -> [`UNKNOWN_LABEL`]
//!
//! An empty matcher answers `unknown` at infinite distance instead of
//! failing. Matchers are immutable; build a new one when the set changes.

mod error;
mod euclidean;
mod matcher;

pub use error::MatchError;
pub use euclidean::euclidean_distance;
pub use matcher::{
    Classification, DEFAULT_THRESHOLD, MatchCandidate, Matcher, UNKNOWN_LABEL,
};
