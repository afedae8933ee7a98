use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use include_dir::{include_dir, Dir};
use parking_lot::RwLock;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    clipboard::CapturedClipboard,
    controller::{ControllerError, NamerController},
    models::{CopyResponse, ImageUpload, RequestState, SessionView},
    naming::NamingService,
    preview::PreviewStore,
};

static STATIC_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/static");

pub struct SessionEntry {
    pub controller: Arc<NamerController>,
    pub last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    pub previews: PreviewStore,
    pub naming: Arc<dyn NamingService>,
}

impl AppState {
    pub fn new(naming: Arc<dyn NamingService>) -> Self {
        Self { sessions: Arc::default(), previews: PreviewStore::new(), naming }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Looks up a session and marks it as recently used.
    fn session(&self, id: &Uuid) -> Result<Arc<NamerController>, ApiError> {
        let mut sessions = self.sessions.write();
        let entry = sessions.get_mut(id).ok_or(ApiError::SessionNotFound)?;
        entry.last_seen = Instant::now();
        Ok(entry.controller.clone())
    }

    /// Drops sessions untouched for at least `ttl`. Sessions with a request
    /// in flight are kept. Returns how many were removed.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let removed: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write();
            let stale: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, e)| {
                    now.duration_since(e.last_seen) >= ttl && e.controller.state() != RequestState::Loading
                })
                .map(|(id, _)| *id)
                .collect();
            stale.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        // controllers, and their previews, are released outside the lock
        let count = removed.len();
        drop(removed);
        if count > 0 {
            tracing::info!("🧹 Reclaimed {} idle session(s)", count);
        }
        count
    }
}

/// Periodically reclaims sessions idle past `ttl`.
pub fn spawn_session_reaper(state: AppState, ttl: Duration) -> JoinHandle<()> {
    let period = std::cmp::max(ttl / 4, Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            state.sweep_idle(ttl);
        }
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found.")]
    SessionNotFound,
    #[error("Not found.")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("Internal server error.")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Controller(ControllerError::Busy | ControllerError::NothingToCopy) => StatusCode::CONFLICT,
            ApiError::Controller(ControllerError::Media(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Controller(ControllerError::EmptyImage) => StatusCode::BAD_REQUEST,
            ApiError::Controller(ControllerError::Clipboard(_)) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/assets/*file", get(asset))
        .route("/preview/:id", get(preview))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/image", post(select_image))
        .route("/api/sessions/:id/generate", post(generate_name))
        .route("/api/sessions/:id/copy", post(copy_name))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn index() -> Result<Html<&'static str>, ApiError> {
    STATIC_DIR
        .get_file("index.html")
        .and_then(|f| f.contents_utf8())
        .map(Html)
        .ok_or(ApiError::NotFound)
}

pub async fn asset(Path(file): Path<String>) -> Result<Response, ApiError> {
    let file = STATIC_DIR.get_file(&file).ok_or(ApiError::NotFound)?;
    let content_type = match file.path().extension().and_then(|e| e.to_str()) {
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], file.contents()).into_response())
}

pub async fn preview(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let entry = state.previews.fetch(&id).ok_or(ApiError::NotFound)?;
    Ok((
        [
            (header::CONTENT_TYPE, entry.media_type.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        entry.data,
    )
        .into_response())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let controller = Arc::new(NamerController::new(state.previews.clone(), state.naming.clone()));
    let view = controller.view();
    state.sessions.write().insert(controller.id(), SessionEntry { controller, last_seen: Instant::now() });
    tracing::info!("🆕 Created session {}", view.id);
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.session(&id)?.view()))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    // an in-flight generation keeps the controller alive until it completes
    state.sessions.write().remove(&id).ok_or(ApiError::SessionNotFound)?;
    tracing::info!("🗑️ Removed session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, ApiError> {
    let controller = state.session(&id)?;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let upload = ImageUpload { file_name, declared_type, data };
        return Ok(Json(controller.select_image(upload)?));
    }

    Err(ApiError::BadRequest("Expected an image file in the upload.".into()))
}

pub async fn generate_name(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let controller = state.session(&id)?;
    // detached so the request finishes even if the client goes away
    let view = tokio::spawn(async move { controller.generate().await })
        .await
        .map_err(|e| {
            tracing::error!("❌ Generation task for session {} failed: {}", id, e);
            ApiError::Internal
        })??;
    Ok(Json(view))
}

pub async fn copy_name(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<CopyResponse>, ApiError> {
    let controller = state.session(&id)?;
    let clipboard = CapturedClipboard::new();
    controller.copy(&clipboard)?;
    let text = clipboard.take().ok_or(ApiError::Internal)?;
    Ok(Json(CopyResponse { text, session: controller.view() }))
}
