use std::sync::Arc;

use faceid_matcher::{Classification, Matcher};
use faceid_store::Embedding;
use tracing::debug;

use crate::cache::MatcherCache;
use crate::error::FaceError;
use crate::events::EventLog;
use crate::extract::Extractor;

/// Classifies query embeddings against the enrolled identities.
///
/// Uses the shared [`MatcherCache`], so a query right after an enrollment in
/// this process sees that enrollment. Known results are recorded in the
/// [`EventLog`] when one is attached.
#[derive(Clone)]
pub struct Recognizer {
    cache: Arc<MatcherCache>,
    events: Option<Arc<EventLog>>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl Recognizer {
    pub fn new(cache: Arc<MatcherCache>) -> Self {
        Self {
            cache,
            events: None,
            extractor: None,
        }
    }

    /// Record every known classification into `events`.
    pub fn with_event_log(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    /// Enable [`recognize_image`](Self::recognize_image).
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Classify one embedding.
    ///
    /// Returns `unknown` at infinite distance when nothing has been
    /// enrolled yet, whatever the query length.
    pub fn recognize(&self, embedding: &[f32]) -> Result<Classification, FaceError> {
        validate_query(embedding)?;
        let matcher = self.cache.get_or_build()?;
        self.classify(&matcher, embedding)
    }

    /// Classify several embeddings (one per face) against one snapshot.
    pub fn recognize_many(
        &self,
        embeddings: &[Embedding],
    ) -> Result<Vec<Classification>, FaceError> {
        for emb in embeddings {
            validate_query(emb)?;
        }
        let matcher = self.cache.get_or_build()?;
        embeddings
            .iter()
            .map(|emb| self.classify(&matcher, emb))
            .collect()
    }

    /// Extract every face from `image`. No face is an empty list.
    pub async fn extract_faces(&self, image: &[u8]) -> Result<Vec<Embedding>, FaceError> {
        let Some(extractor) = &self.extractor else {
            return Err(FaceError::InvalidInput(
                "image recognition is not configured".into(),
            ));
        };
        Ok(extractor.extract_all(image).await?)
    }

    /// Extract every face from `image` and classify each one.
    pub async fn recognize_image(&self, image: &[u8]) -> Result<Vec<Classification>, FaceError> {
        let faces = self.extract_faces(image).await?;
        self.recognize_many(&faces)
    }

    fn classify(&self, matcher: &Matcher, embedding: &[f32]) -> Result<Classification, FaceError> {
        if matcher.is_empty() {
            return Ok(Classification::no_candidates());
        }
        let result = matcher.classify(embedding)?;
        debug!(label = %result.label, distance = result.distance, "classified");
        if result.is_known() {
            if let Some(events) = &self.events {
                events.record(&result.label, result.distance);
            }
        }
        Ok(result)
    }
}

fn validate_query(embedding: &[f32]) -> Result<(), FaceError> {
    if embedding.is_empty() {
        return Err(FaceError::InvalidInput("embedding is required".into()));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(FaceError::InvalidInput(
            "embedding contains a non-finite value".into(),
        ));
    }
    Ok(())
}
