//! Admin and scheduled-job endpoints.
//!
//! Admin identity comes from the `x-admin-email` header or an `email`
//! query parameter and is matched against the configured allow-list and
//! admin domain. It is not verified. The cron trigger requires the shared
//! bearer secret.

use crate::{
    errors::AppError,
    models::{
        upload::UploadRecord,
        usage::{FeatureFlagSet, UsageSnapshot},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

pub const ADMIN_EMAIL_HEADER: &str = "x-admin-email";

#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct UsageReport {
    pub usage: UsageSnapshot,
    pub flags: FeatureFlagSet,
}

/// Resolve the caller's email and check it against the admin settings.
fn require_admin(state: &AppState, headers: &HeaderMap, query: &AdminQuery) -> Result<String, AppError> {
    let email = headers
        .get(ADMIN_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.email.clone())
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::unauthorized("admin email is required"))?;

    if !state.config.admin.is_admin(&email) {
        warn!("rejected admin request from {}", email);
        return Err(AppError::forbidden("admin access required"));
    }
    Ok(email)
}

/// `GET /api/admin/usage`
pub async fn usage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
) -> Result<Json<UsageReport>, AppError> {
    require_admin(&state, &headers, &query)?;
    let (usage, flags) = state.service.usage_report().await;
    Ok(Json(UsageReport { usage, flags }))
}

/// `DELETE /api/admin/inspirations/{id}`
pub async fn delete_inspiration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
    Path(id): Path<String>,
) -> Result<Json<UploadRecord>, AppError> {
    let admin = require_admin(&state, &headers, &query)?;
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| AppError::bad_request(format!("`{}` is not a valid id", id)))?;

    let record = state.service.delete(id).await?;
    info!("{} deleted inspiration {}", admin, id);
    Ok(Json(record))
}

/// `GET|POST /api/cron/usage-check`: recompute usage and refresh the cache.
pub async fn usage_check(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageReport>, AppError> {
    let secret = state
        .config
        .cron_secret
        .as_deref()
        .ok_or_else(|| AppError::unavailable("cron secret not configured"))?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if !bool::from(presented.as_bytes().ct_eq(secret.as_bytes())) {
        warn!("rejected usage check with bad credentials");
        return Err(AppError::unauthorized("invalid cron credentials"));
    }

    let (usage, flags) = state.service.refresh_usage().await;
    info!(
        "usage refreshed: storage {:.1}%, kv {:.1}%, ai {:.1}%",
        usage.object_storage, usage.key_value_store, usage.ai_quota
    );
    Ok(Json(UsageReport { usage, flags }))
}
