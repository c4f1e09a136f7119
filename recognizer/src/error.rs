use faceid_matcher::MatchError;
use faceid_store::StoreError;
use thiserror::Error;

use crate::extract::ExtractError;

/// Errors returned by the enrollment and recognition pipelines.
///
/// `InvalidInput`, `DimensionMismatch` and `NoEmbeddingAvailable` are the
/// caller's fault; `StoreUnavailable` and `ExtractorUnavailable` are ours
/// and may be retried by the caller. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("no embedding available: {0}")]
    NoEmbeddingAvailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl FaceError {
    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::DimensionMismatch { .. }
                | Self::NoEmbeddingAvailable(_)
                | Self::Unauthorized
        )
    }
}

impl From<StoreError> for FaceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => FaceError::InvalidInput(msg),
            StoreError::DimensionMismatch { expected, got } => {
                FaceError::DimensionMismatch { expected, got }
            }
            StoreError::NotFound(key) => {
                FaceError::InvalidInput(format!("unknown identity {key:?}"))
            }
            e @ (StoreError::Unavailable(_) | StoreError::Serialization(_)) => {
                FaceError::StoreUnavailable(e.to_string())
            }
        }
    }
}

impl From<MatchError> for FaceError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::DimensionMismatch { expected, got } => {
                FaceError::DimensionMismatch { expected, got }
            }
        }
    }
}

impl From<ExtractError> for FaceError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::NoFace => {
                FaceError::NoEmbeddingAvailable("no face detected in the image".into())
            }
            ExtractError::InvalidImage(msg) => FaceError::InvalidInput(msg),
            ExtractError::Api(msg) => FaceError::ExtractorUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let e: FaceError = StoreError::Validation("empty key".into()).into();
        assert!(matches!(e, FaceError::InvalidInput(_)));

        let (expected, got) = (128, 3);
        let e: FaceError = StoreError::DimensionMismatch { expected, got }.into();
        assert_eq!(e.to_string(), "dimension mismatch: expected 128, got 3");

        let e: FaceError = StoreError::Unavailable("disk gone".into()).into();
        assert!(matches!(e, FaceError::StoreUnavailable(ref m) if m.contains("disk gone")));
        assert!(!e.is_client_error());
    }

    #[test]
    fn extract_errors_map_to_taxonomy() {
        let e: FaceError = ExtractError::NoFace.into();
        assert!(matches!(e, FaceError::NoEmbeddingAvailable(_)));
        assert!(e.is_client_error());

        let e: FaceError = ExtractError::Api("HTTP 503".into()).into();
        assert!(matches!(e, FaceError::ExtractorUnavailable(_)));
        assert!(!e.is_client_error());
    }
}
