use thiserror::Error;

/// Errors returned by [`Matcher`](crate::Matcher) queries.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matcher: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
