//! HTTP surface: clone, preview, health, and the embedded frontend

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use magpie_core::{CloneError, CloneMode, CloneService};
use serde::{Deserialize, Serialize};
use tracing::error;

pub type SharedService = Arc<CloneService>;

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/clone-website", post(clone_website))
        .route("/preview/:preview_id", get(preview))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct CloneRequest {
    pub url: String,
    #[serde(default)]
    pub is_small: bool,
}

#[derive(Debug, Serialize)]
pub struct CloneResponse {
    pub html: String,
    pub preview_id: String,
}

/// Maps pipeline failures onto a `{ "detail": ... }` payload. Messages are
/// human-readable causes; internals and credentials stay out of them.
pub struct ApiError(CloneError);

impl From<CloneError> for ApiError {
    fn from(error: CloneError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CloneError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CloneError::NotFound(_) => StatusCode::NOT_FOUND,
            CloneError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            CloneError::Navigation(_)
            | CloneError::Capture(_)
            | CloneError::ExternalService(_)
            | CloneError::Http(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!("clone request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn clone_website(
    State(service): State<SharedService>,
    Json(request): Json<CloneRequest>,
) -> Result<Json<CloneResponse>, ApiError> {
    let mode = CloneMode::from_is_small(request.is_small);
    let document = service.clone_site(&request.url, mode).await?;
    Ok(Json(CloneResponse {
        html: document.html,
        preview_id: document.preview_id,
    }))
}

async fn preview(
    State(service): State<SharedService>,
    Path(preview_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let document = service.preview(&preview_id).await?;
    Ok(Html(document.html))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "magpie" }))
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}
