use std::sync::Arc;

use faceid_matcher::UNKNOWN_LABEL;
use faceid_store::{Embedding, normalize_display_name, normalize_key};
use tracing::{info, warn};

use crate::cache::MatcherCache;
use crate::error::FaceError;
use crate::extract::{ExtractError, Extractor};

/// Outcome of a successful enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrolled {
    /// Normalized identity key.
    pub key: String,

    /// Display name as stored.
    pub display_name: String,

    /// Number of embeddings now stored for the identity.
    pub embeddings: usize,

    /// User-facing confirmation.
    pub message: String,
}

/// Stores faces under a person's name.
///
/// Enrolling a name that normalizes to an existing key replaces that
/// identity's embeddings. Every successful write invalidates the matcher
/// cache before returning.
#[derive(Clone)]
pub struct Enroller {
    cache: Arc<MatcherCache>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl Enroller {
    pub fn new(cache: Arc<MatcherCache>) -> Self {
        Self {
            cache,
            extractor: None,
        }
    }

    /// Enable [`enroll_images`](Self::enroll_images).
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Enroll `name` with one or more embeddings from one capture session.
    pub fn enroll(&self, name: &str, embeddings: Vec<Embedding>) -> Result<Enrolled, FaceError> {
        let display_name = normalize_display_name(name);
        let key = normalize_key(&display_name);
        if key.is_empty() {
            return Err(FaceError::InvalidInput("name is required".into()));
        }
        if key == UNKNOWN_LABEL {
            return Err(FaceError::InvalidInput(format!(
                "{UNKNOWN_LABEL:?} is reserved and cannot be enrolled"
            )));
        }
        if embeddings.is_empty() {
            return Err(FaceError::InvalidInput("embedding is required".into()));
        }

        let identity = self.cache.store().put(&key, &display_name, embeddings)?;
        self.cache.invalidate();

        info!(
            key = %identity.key,
            embeddings = identity.embeddings.len(),
            "identity enrolled"
        );
        Ok(Enrolled {
            message: format!("Successfully enrolled {}.", identity.display_name),
            key: identity.key,
            display_name: identity.display_name,
            embeddings: identity.embeddings.len(),
        })
    }

    /// Extract one embedding per image, skipping images without a face.
    ///
    /// Fails with `NoEmbeddingAvailable` when no image yields a face.
    pub async fn extract_embeddings(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Vec<Embedding>, FaceError> {
        let Some(extractor) = &self.extractor else {
            return Err(FaceError::InvalidInput(
                "image enrollment is not configured".into(),
            ));
        };
        if images.is_empty() {
            return Err(FaceError::InvalidInput("image is required".into()));
        }

        let mut embeddings = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            match extractor.extract(image).await {
                Ok(emb) => embeddings.push(emb),
                Err(ExtractError::NoFace) => warn!(image = i, "no face found, skipping"),
                Err(e) => return Err(e.into()),
            }
        }
        if embeddings.is_empty() {
            return Err(FaceError::NoEmbeddingAvailable(
                "no face detected in the image. Please try again.".into(),
            ));
        }
        Ok(embeddings)
    }

    /// Extract faces from `images` and enroll them under `name`.
    pub async fn enroll_images(
        &self,
        name: &str,
        images: &[Vec<u8>],
    ) -> Result<Enrolled, FaceError> {
        if normalize_key(name).is_empty() {
            return Err(FaceError::InvalidInput("name is required".into()));
        }
        let embeddings = self.extract_embeddings(images).await?;
        self.enroll(name, embeddings)
    }
}
