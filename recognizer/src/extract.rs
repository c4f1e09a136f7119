use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use faceid_store::Embedding;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by an [`Extractor`].
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extract: no face detected")]
    NoFace,

    #[error("extract: invalid image: {0}")]
    InvalidImage(String),

    #[error("extract: service error: {0}")]
    Api(String),
}

/// Turns an encoded image into face embeddings.
///
/// This is the only place an image is looked at; the pipelines depend on
/// this trait and never on a vision library. Implementations must be safe
/// for concurrent use.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Return one embedding per detected face. No face is `Ok(vec![])`.
    async fn extract_all(&self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError>;

    /// Return the embedding of the first detected face.
    async fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractError> {
        self.extract_all(image)
            .await?
            .into_iter()
            .next()
            .ok_or(ExtractError::NoFace)
    }
}

/// Decode a base64 image, with or without a `data:image/...;base64,` prefix.
pub fn decode_image(data: &str) -> Result<Vec<u8>, ExtractError> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => match rest.split_once("base64,") {
            Some((_, payload)) => payload,
            None => {
                return Err(ExtractError::InvalidImage(
                    "data URL is not base64-encoded".into(),
                ));
            }
        },
        None => data,
    };
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ExtractError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ExtractError::InvalidImage("image is empty".into()));
    }
    Ok(bytes)
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    faces: Vec<Vec<f64>>,
}

/// [`Extractor`] backed by a remote face-embedding service.
///
/// Sends `POST {url}` with `{"image": "<base64>"}` and expects
/// `{"faces": [[...], ...]}`, one vector per detected face.
pub struct HttpExtractor {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpExtractor {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            api_key: None,
        }
    }

    /// Use a client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ExtractError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Api(e.to_string()))?;
        Ok(self)
    }

    /// Send `Authorization: Bearer {key}` with every request.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

#[async_trait::async_trait]
impl Extractor for HttpExtractor {
    async fn extract_all(&self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError> {
        if image.is_empty() {
            return Err(ExtractError::InvalidImage("image is empty".into()));
        }
        let encoded = BASE64.encode(image);

        let mut req = self
            .client
            .post(&self.url)
            .json(&ExtractRequest { image: &encoded });
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ExtractError::Api(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 422 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::InvalidImage(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Api(format!("HTTP {status}: {body}")));
        }

        let data: ExtractResponse = resp
            .json()
            .await
            .map_err(|e| ExtractError::Api(e.to_string()))?;

        Ok(data
            .faces
            .into_iter()
            .map(|face| face.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}
