use crate::catalog::Synchronizer;
use crate::config::{ApiConfig, LimitsConfig};
use crate::crud::MediaCrud;
use crate::csrf::CsrfTokens;
use crate::encoder::{CompressionTier, VideoEncoder};
use crate::error::{MediaError, TransportError, ValidationError};
use crate::model::{normalize_tags, AssetKind, AssetPatch, AssetRecord, CatalogEntry};
use crate::paths::{is_public_extension, MediaPaths};
use crate::upload::{UploadPipeline, UploadRequest, UploadResponse};
use crate::validate::UploadedFile;
use crate::video_index::VideoIndex;
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub crud: Arc<MediaCrud>,
    pub pipeline: Arc<UploadPipeline>,
    pub synchronizer: Arc<Synchronizer>,
    pub csrf: Arc<CsrfTokens>,
    pub index: Arc<VideoIndex>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub paths: MediaPaths,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, limits: &LimitsConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/photos", get(list_photos).post(mutate_photos))
        .route("/api/videos", get(list_videos).post(mutate_videos))
        .route("/api/blogs", get(list_blogs).post(mutate_blogs))
        .route("/api/videos/catalog", get(video_catalog))
        .route("/api/upload", post(advanced_upload))
        .route("/api/upload/token", get(issue_upload_token))
        .route("/assets/*path", get(serve_asset))
        .layer(DefaultBodyLimit::max(limits.request_body_ceiling()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint, reports the active encoder backend
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.encoder.available() {
        "healthy"
    } else {
        "degraded"
    };
    Json(serde_json::json!({
        "status": status,
        "service": "folio-media",
        "encoder": {
            "backend": state.encoder.name(),
            "available": state.encoder.available(),
        }
    }))
}

/// Readiness check endpoint, gated on the video index
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(state.index.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

async fn list_photos(
    State(state): State<AppState>,
) -> Result<Json<Vec<AssetRecord>>, MediaError> {
    Ok(Json(state.crud.list(AssetKind::Photo).await?))
}

async fn list_videos(
    State(state): State<AppState>,
) -> Result<Json<Vec<AssetRecord>>, MediaError> {
    Ok(Json(state.crud.list(AssetKind::Video).await?))
}

async fn list_blogs(State(state): State<AppState>) -> Result<Json<Vec<AssetRecord>>, MediaError> {
    Ok(Json(state.crud.list(AssetKind::Blog).await?))
}

async fn mutate_photos(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, MediaError> {
    mutate_collection(state, AssetKind::Photo, multipart).await
}

async fn mutate_videos(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, MediaError> {
    mutate_collection(state, AssetKind::Video, multipart).await
}

async fn mutate_blogs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, MediaError> {
    mutate_collection(state, AssetKind::Blog, multipart).await
}

/// Dispatch one collection mutation by its `action` field
#[instrument(skip(state, multipart), fields(kind = kind.as_str()))]
async fn mutate_collection(
    state: AppState,
    kind: AssetKind,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, MediaError> {
    let form = parse_record_form(multipart).await?;
    let action = form.action.ok_or(ValidationError::MissingField("action"))?;
    match action.as_str() {
        "save" => {
            let id = state.crud.save(kind, form.patch, form.file).await?;
            Ok(Json(serde_json::json!({ "success": true, "id": id })))
        }
        "delete" => {
            let id = form.patch.id.ok_or(ValidationError::MissingField("id"))?;
            state.crud.delete(kind, &id).await?;
            Ok(Json(serde_json::json!({ "success": true })))
        }
        other => Err(ValidationError::InvalidValue {
            field: "action",
            reason: format!("expected \"save\" or \"delete\", got \"{other}\""),
        }
        .into()),
    }
}

/// Videos as the front end reads them, straight from the relational side
async fn video_catalog(
    State(state): State<AppState>,
) -> Result<Json<Vec<CatalogEntry>>, MediaError> {
    Ok(Json(state.synchronizer.entries().await?))
}

/// Mint a fresh single-use upload token
async fn issue_upload_token(State(state): State<AppState>) -> impl IntoResponse {
    let token = state.csrf.issue().await;
    Json(serde_json::json!({ "success": true, "csrf_token": token }))
}

/// Token-checked video ingestion endpoint
#[instrument(skip(state, multipart), fields(ip = %addr.ip()))]
async fn advanced_upload(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, MediaError> {
    let request = parse_upload_form(multipart).await?;
    if !state.csrf.consume(&request.csrf_token).await {
        return Err(MediaError::CsrfRejected);
    }
    let response = state.pipeline.process(&addr.ip().to_string(), request).await?;
    Ok(Json(response))
}

/// Stream one stored asset; everything outside the extension allow-list is a 404
async fn serve_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, StatusCode> {
    if !is_public_extension(&path) {
        return Err(StatusCode::NOT_FOUND);
    }
    let disk = state
        .paths
        .resolve_public(&format!("assets/{path}"))
        .ok_or(StatusCode::NOT_FOUND)?;
    let file = tokio::fs::File::open(&disk)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let mime = mime_guess::from_path(&disk).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, mime.as_ref())], body).into_response())
}

/// Accumulated multipart fields for a collection mutation
#[derive(Default)]
struct RecordForm {
    action: Option<String>,
    patch: AssetPatch,
    file: Option<UploadedFile>,
}

async fn parse_record_form(mut multipart: Multipart) -> Result<RecordForm, MediaError> {
    let mut form = RecordForm::default();
    while let Some(field) = multipart.next_field().await.map_err(transport_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = read_file_field(field).await?,
            "action" => form.action = Some(text(field).await?),
            "id" => form.patch.id = Some(text(field).await?),
            "title" => form.patch.title = Some(text(field).await?),
            "description" => form.patch.description = Some(text(field).await?),
            "category" => form.patch.category = Some(text(field).await?),
            "tags" => form.patch.tags = Some(normalize_tags(&text(field).await?)),
            "excerpt" => form.patch.excerpt = Some(text(field).await?),
            "author" => form.patch.author = Some(text(field).await?),
            "duration" => form.patch.duration = Some(text(field).await?),
            "resolution" => form.patch.resolution = Some(text(field).await?),
            _ => return Err(ValidationError::UnknownField(name).into()),
        }
    }
    Ok(form)
}

async fn parse_upload_form(mut multipart: Multipart) -> Result<UploadRequest, MediaError> {
    let mut request = UploadRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(transport_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => request.video = read_file_field(field).await?,
            "thumbnail" => request.thumbnail = read_file_field(field).await?,
            "title" => request.title = Some(text(field).await?),
            "description" => request.description = text(field).await?,
            "category" => request.category = text(field).await?,
            "tags" => request.tags = normalize_tags(&text(field).await?),
            "compression_level" => {
                let raw = text(field).await?;
                request.tier =
                    CompressionTier::parse(&raw).ok_or_else(|| ValidationError::InvalidValue {
                        field: "compression_level",
                        reason: format!("unknown level \"{raw}\""),
                    })?;
            }
            // The front end posts the literal string "true" when the box is ticked
            "github_integration" => request.github_integration = text(field).await? == "true",
            "csrf_token" => request.csrf_token = text(field).await?,
            _ => return Err(ValidationError::UnknownField(name).into()),
        }
    }
    Ok(request)
}

/// Browsers send an empty part for a file input left blank
async fn read_file_field(field: Field<'_>) -> Result<Option<UploadedFile>, MediaError> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await.map_err(transport_error)?;
    if original_name.is_empty() && bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(UploadedFile::complete(original_name, bytes)))
}

async fn text(field: Field<'_>) -> Result<String, MediaError> {
    field.text().await.map_err(transport_error)
}

/// A body over the limit and a body cut short read differently on the wire
fn transport_error(err: MultipartError) -> MediaError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TransportError::SizeExceeded.into()
    } else {
        TransportError::Partial.into()
    }
}

/// Start the media API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    limits: &LimitsConfig,
) -> Result<()> {
    let router = create_router(state, config, limits);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting media API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("API server error")?;

    Ok(())
}
