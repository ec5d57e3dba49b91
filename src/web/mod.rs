// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON API and image endpoints for the gallery

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::db::Database;
use crate::gallery::{CollectionView, Gallery, ImageView, NextView, RefinementView};
use crate::RefineError;

/// Shared application state
pub struct AppState {
    pub gallery: Gallery,
    pub config: AppConfig,
}

type ApiResult<T> = std::result::Result<T, RefineError>;

impl IntoResponse for RefineError {
    fn into_response(self) -> Response {
        let status = match &self {
            RefineError::NotFound(_) => StatusCode::NOT_FOUND,
            RefineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RefineError::InvalidState(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.is_user_error() {
            self.to_string()
        } else {
            error!("Request failed: {}", self);
            "internal server error".to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/ping", get(ping))
        // Collections
        .route("/api/collections", get(api_list_collections))
        .route("/api/collections/:folder", get(api_collection_images))
        // Refinements
        .route("/api/refinements", get(api_list_refinements).post(api_start_refinement))
        .route("/api/refinements/:id", get(api_get_refinement))
        .route("/api/refinements/:id/current", get(api_current_item))
        .route("/api/refinements/:id/rate", post(api_rate))
        .route("/api/refinements/:id/yes", get(api_yes_collection))
        // Image bytes
        .route("/media/:folder/:name", get(media))
        .route("/thumbs/:folder/:name", get(thumbnail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ping() -> &'static str {
    "pong"
}

// === Collections ===

async fn api_list_collections(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<CollectionView>>> {
    Ok(Json(state.gallery.list_collections()?))
}

async fn api_collection_images(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
) -> ApiResult<Json<Vec<ImageView>>> {
    Ok(Json(state.gallery.collection_images(&folder)?))
}

// === Refinements ===

#[derive(Deserialize)]
struct RefinementsQuery {
    status: Option<String>,
}

async fn api_list_refinements(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefinementsQuery>,
) -> ApiResult<Json<Vec<RefinementView>>> {
    let refinements = match query.status.as_deref().unwrap_or("active") {
        "active" => state.gallery.active_refinements()?,
        "complete" | "completed" => state.gallery.completed_refinements()?,
        other => {
            return Err(RefineError::InvalidInput(format!(
                "status must be active or complete, got {:?}",
                other
            )))
        }
    };
    Ok(Json(refinements))
}

#[derive(Deserialize)]
struct StartRequest {
    source_type: String,
    source_key: String,
    #[serde(default)]
    name: String,
}

#[derive(Serialize)]
struct StartResponse {
    id: i64,
}

async fn api_start_refinement(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    let id = state
        .gallery
        .start_refinement(&request.source_type, &request.source_key, &request.name)?;
    Ok((StatusCode::CREATED, Json(StartResponse { id })))
}

async fn api_get_refinement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RefinementView>> {
    Ok(Json(state.gallery.refinement(id)?))
}

async fn api_current_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NextView>> {
    Ok(Json(state.gallery.current_item(id)?))
}

#[derive(Deserialize)]
struct RateRequest {
    item_id: i64,
    rating: String,
}

async fn api_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<RateRequest>,
) -> ApiResult<Json<NextView>> {
    Ok(Json(state.gallery.rate(id, request.item_id, &request.rating)?))
}

async fn api_yes_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ImageView>>> {
    Ok(Json(state.gallery.yes_collection(id)?))
}

// === Image bytes ===

/// Stream a file from disk; content type comes from the extension
async fn send_file(path: &FsPath, request: Request) -> ApiResult<Response> {
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.into_response())
}

async fn media(
    State(state): State<Arc<AppState>>,
    Path((folder, name)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.gallery.image_path(&folder, &name)?;
    send_file(&path, request).await
}

async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Path((folder, name)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Response> {
    let gallery = state.gallery.clone();
    let path = tokio::task::spawn_blocking(move || gallery.thumbnail_for(&folder, &name)).await??;
    send_file(&path, request).await
}

/// Start the web server with config and database
pub async fn start_server(config: AppConfig, db: Database) -> crate::Result<()> {
    let state = Arc::new(AppState {
        gallery: Gallery::from_config(&config, db),
        config: config.clone(),
    });

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Gallery available at http://{}", addr);
    info!("Serving collections from {:?}", state.config.photos_dir);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| RefineError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
