//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness over the local database and media directory,
//!   plus the storage tiers currently configured

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite when the local tier uses it, and a
/// write/read/delete round trip in the local media directory when one is
/// configured. Checks that do not apply are omitted. HTTP 503 when any
/// check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = HashMap::new();

    if let Some(db) = &state.db {
        let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&**db)
            .await
        {
            Ok(1) => CheckStatus::ok(),
            Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
            Err(e) => CheckStatus::failed(format!("error: {}", e)),
        };
        checks.insert("sqlite", sqlite_check);
    }

    if let Some(local) = state.service.media.local() {
        checks.insert("disk", disk_check(&local.base_path).await);
    }

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        tiers: state.service.tiers.configured(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn disk_check(base_path: &Path) -> CheckStatus {
    if let Err(e) = fs::create_dir_all(base_path).await {
        return CheckStatus::failed(format!("could not create media dir: {}", e));
    }
    let tmp_path = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }
    let read = fs::read(&tmp_path).await;
    let removed = fs::remove_file(&tmp_path).await;
    match read {
        Ok(bytes) if bytes == b"readyz" => match removed {
            Ok(_) => CheckStatus::ok(),
            Err(e) => CheckStatus {
                ok: true,
                error: Some(format!("could not remove tmp file: {}", e)),
            },
        },
        Ok(_) => CheckStatus::failed("file content mismatch".to_string()),
        Err(e) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    tiers: Vec<&'static str>,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
