//! HTTP handlers for the public inspirations API.
//! Validation and storage live in `InspirationService`; handlers only
//! shape requests and responses.

use crate::{
    errors::AppError,
    models::{
        leaderboard::{LeaderboardEntry, UserProfile},
        usage::FeatureFlagSet,
    },
    services::{
        inspiration_service::{InspirationPage, NewInspiration, Submission, UploadedFile},
        limits::UploadLimit,
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub source: &'static str,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub source: &'static str,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub text: String,
}

/// `POST /api/inspirations`
///
/// Multipart form with `name`, `email`, `category`, `title`, optional
/// `description` and `role`, and exactly one of `file` or `link`.
pub async fn submit_inspiration(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let mut input = NewInspiration::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                debug!("received file part {} ({} bytes)", file_name, data.len());
                input.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "link" => input.link = Some(field.text().await?),
            "name" => input.name = Some(field.text().await?),
            "email" => input.email = Some(field.text().await?),
            "category" => input.category = Some(field.text().await?),
            "title" => input.title = Some(field.text().await?),
            "description" => input.description = Some(field.text().await?),
            "role" => input.role = Some(field.text().await?),
            _ => {}
        }
    }

    let submission = state.service.submit(input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// `GET /api/inspirations?limit&offset`
pub async fn list_inspirations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<InspirationPage> {
    Json(state.service.list(query.limit, query.offset).await)
}

/// `GET /api/inspirations/leaderboard?limit`
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<LeaderboardResponse> {
    let read = state.service.leaderboard(query.limit).await;
    Json(LeaderboardResponse {
        entries: read.value,
        source: read.tier,
    })
}

/// `GET /api/inspirations/limit?email`
pub async fn upload_limit(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<UploadLimit>, AppError> {
    let email = query
        .email
        .ok_or_else(|| AppError::bad_request("email is required"))?;
    Ok(Json(state.service.upload_limit(&email, Utc::now()).await?))
}

/// `GET /api/users/{email}`
pub async fn user_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let read = state.service.profile(&email).await?;
    Ok(Json(ProfileResponse {
        profile: read.value,
        source: read.tier,
    }))
}

/// `GET /api/features`
pub async fn features(State(state): State<AppState>) -> Json<FeatureFlagSet> {
    Json(state.service.flags().await)
}

/// `POST /api/ai/generate`
pub async fn generate_description(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let text = state.service.generate(&request.prompt).await?;
    Ok(Json(GenerateResponse { text }))
}

/// `GET /media/{*key}`: stream a locally stored file.
pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let local = state
        .service
        .media
        .local()
        .ok_or_else(|| AppError::not_found("local media storage is not enabled"))?;
    let (file, len) = local.open(&key).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&key)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response.into_response())
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
