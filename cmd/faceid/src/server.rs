//! HTTP API.
//!
//! API endpoints:
//! - GET  /health            - Liveness, never guarded
//! - POST /api/enroll        - Enroll a name with embeddings or images
//! - POST /api/recognize     - Classify one embedding, several, or an image
//! - GET  /api/events        - Recent recognitions, newest first
//! - GET  /api/identities    - Enrolled identities
//! - GET  /api/admin/status  - Store summary
//! - GET  /                  - Static files, when configured
//!
//! When an API key is configured every `/api` route requires a matching
//! `X-API-Key` header. Errors are returned as `{"message": "..."}`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use faceid_recognizer::{
    Classification, Enroller, EventLog, Extractor, FaceError, HttpExtractor, MatcherCache,
    RecognitionEvent, Recognizer, decode_image,
};
use faceid_store::{DescriptorStore, Embedding};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::{Config, parse_addr};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<MatcherCache>,
    enroller: Enroller,
    recognizer: Recognizer,
    events: Arc<EventLog>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// Wire the store, cache, pipelines and extractor described by `cfg`.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::with_store(cfg.open_store()?, cfg)
    }

    /// Like [`from_config`](Self::from_config) over an already open store.
    pub fn with_store(store: DescriptorStore, cfg: &Config) -> Result<Self> {
        let cache = Arc::new(MatcherCache::new(Arc::new(store), cfg.cache_config()));
        let events = Arc::new(EventLog::new(cfg.event_log_capacity));

        let mut enroller = Enroller::new(Arc::clone(&cache));
        let mut recognizer = Recognizer::new(Arc::clone(&cache))
            .with_event_log(Arc::clone(&events));

        if let Some(ex) = &cfg.extractor {
            let mut http = HttpExtractor::new(&ex.url)
                .with_timeout(Duration::from_secs(ex.timeout_secs))?;
            if let Some(key) = &ex.api_key {
                http = http.with_api_key(key);
            }
            let extractor: Arc<dyn Extractor> = Arc::new(http);
            enroller = enroller.with_extractor(Arc::clone(&extractor));
            recognizer = recognizer.with_extractor(extractor);
            info!(url = %ex.url, "image extraction enabled");
        }

        Ok(Self {
            cache,
            enroller,
            recognizer,
            events,
            api_key: cfg.api_key.as_deref().map(Arc::from),
        })
    }
}

/// Build the router.
pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/enroll", post(enroll))
        .route("/api/recognize", post(recognize))
        .route("/api/events", get(events))
        .route("/api/identities", get(identities))
        .route("/api/admin/status", get(admin_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let mut app = Router::new().route("/health", get(health)).merge(api);

    if let Some(dir) = static_dir {
        if dir.exists() {
            app = app.fallback_service(ServeDir::new(dir));
        } else {
            warn!(dir = %dir.display(), "static dir not found");
        }
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState, static_dir: Option<PathBuf>) -> Result<()> {
    let addr = parse_addr(addr)?;
    let app = router(state, static_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "faceid listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

/// Error response with a JSON `{message}` body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<FaceError> for ApiError {
    fn from(e: FaceError) -> Self {
        let status = match &e {
            FaceError::Unauthorized => StatusCode::UNAUTHORIZED,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &e {
            FaceError::InvalidInput(msg) | FaceError::NoEmbeddingAvailable(msg) => msg.clone(),
            FaceError::Unauthorized => "Unauthorized".to_string(),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("worker failed: {e}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "request failed");
        } else {
            debug!(status = %self.status, message = %self.message, "request rejected");
        }
        (
            self.status,
            Json(MessageResponse {
                message: self.message,
            }),
        )
            .into_response()
    }
}

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = &state.api_key {
        let ok = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected.as_ref());
        if !ok {
            warn!(path = %req.uri().path(), "rejected request without a valid API key");
            return ApiError::from(FaceError::Unauthorized).into_response();
        }
    }
    next.run(req).await
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct EnrollRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    embedding: Option<Embedding>,
    #[serde(default)]
    embeddings: Option<Vec<Embedding>>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
}

async fn enroll(
    State(state): State<AppState>,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name and embedding are required."));
    }

    let mut embeddings: Vec<Embedding> = req.embedding.into_iter().collect();
    embeddings.extend(req.embeddings.unwrap_or_default());

    let images = req
        .image
        .into_iter()
        .chain(req.images.unwrap_or_default())
        .map(|data| decode_image(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(FaceError::from)?;

    if embeddings.is_empty() && images.is_empty() {
        return Err(ApiError::bad_request("Name and embedding are required."));
    }

    if !images.is_empty() {
        match state.enroller.extract_embeddings(&images).await {
            Ok(extracted) => embeddings.extend(extracted),
            Err(FaceError::NoEmbeddingAvailable(_)) if !embeddings.is_empty() => {
                debug!("no face in uploaded images, enrolling given embeddings only");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let enroller = state.enroller.clone();
    let name = req.name;
    let out = tokio::task::spawn_blocking(move || enroller.enroll(&name, embeddings))
        .await??;
    Ok(Json(MessageResponse {
        message: out.message,
    }))
}

#[derive(Debug, Deserialize)]
struct RecognizeRequest {
    #[serde(default)]
    embedding: Option<Embedding>,
    #[serde(default)]
    embeddings: Option<Vec<Embedding>>,
    #[serde(default)]
    image: Option<String>,
}

/// A classification on the wire. Infinite distance becomes `null`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ClassificationBody {
    label: String,
    distance: Option<f32>,
}

impl From<Classification> for ClassificationBody {
    fn from(c: Classification) -> Self {
        Self {
            distance: c.distance.is_finite().then_some(c.distance),
            label: c.label,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RecognizeResponse {
    One(ClassificationBody),
    Many(Vec<ClassificationBody>),
}

async fn recognize(
    State(state): State<AppState>,
    payload: Result<Json<RecognizeRequest>, JsonRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let Json(req) = payload?;
    let recognizer = state.recognizer.clone();

    if let Some(embedding) = req.embedding {
        let c = tokio::task::spawn_blocking(move || recognizer.recognize(&embedding))
            .await??;
        return Ok(Json(RecognizeResponse::One(c.into())));
    }

    let batch = match (req.embeddings, req.image) {
        (Some(embeddings), _) => {
            if embeddings.is_empty() {
                return Err(ApiError::bad_request("Embedding is required."));
            }
            embeddings
        }
        (None, Some(image)) => {
            let image = decode_image(&image).map_err(FaceError::from)?;
            recognizer.extract_faces(&image).await?
        }
        (None, None) => return Err(ApiError::bad_request("Embedding is required.")),
    };

    let results = tokio::task::spawn_blocking(move || recognizer.recognize_many(&batch))
        .await??;
    Ok(Json(RecognizeResponse::Many(
        results.into_iter().map(ClassificationBody::from).collect(),
    )))
}

async fn events(State(state): State<AppState>) -> Json<Vec<RecognitionEvent>> {
    Json(state.events.recent())
}

#[derive(Debug, Serialize)]
struct IdentitySummary {
    key: String,
    display_name: String,
    embeddings: usize,
    enrolled_at: DateTime<Utc>,
}

async fn identities(
    State(state): State<AppState>,
) -> Result<Json<Vec<IdentitySummary>>, ApiError> {
    let store = Arc::clone(state.cache.store());
    let all = tokio::task::spawn_blocking(move || store.list())
        .await?
        .map_err(FaceError::from)?;
    Ok(Json(
        all.into_iter()
            .map(|id| IdentitySummary {
                embeddings: id.embeddings.len(),
                key: id.key,
                display_name: id.display_name,
                enrolled_at: id.enrolled_at,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
struct AdminStatus {
    message: String,
    identities: usize,
    dimension: Option<usize>,
    threshold: f32,
    generation: u64,
}

async fn admin_status(State(state): State<AppState>) -> Result<Json<AdminStatus>, ApiError> {
    let store = Arc::clone(state.cache.store());
    let (identities, dimension) = tokio::task::spawn_blocking(move || {
        Ok::<_, FaceError>((store.len()?, store.dimension()?))
    })
    .await??;
    Ok(Json(AdminStatus {
        message: "Admin access granted.".to_string(),
        identities,
        dimension,
        threshold: state.cache.threshold(),
        generation: state.cache.generation(),
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
