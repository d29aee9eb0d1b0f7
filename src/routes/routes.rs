//! Defines routes for the inspirations API.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `POST /api/inspirations` multipart submission
//!   - `GET  /api/inspirations` paginated feed (`limit`, `offset`)
//!   - `GET  /api/inspirations/leaderboard` ranked uploaders
//!   - `GET  /api/inspirations/limit` daily upload allowance for `email`
//!   - `GET  /api/users/{email}` user profile
//!   - `GET  /api/features` feature flags
//!   - `POST /api/ai/generate` description suggestion
//!   - `GET  /media/{*key}` locally stored media
//!
//! - **Admin and scheduled endpoints**
//!   - `GET    /api/admin/usage`
//!   - `DELETE /api/admin/inspirations/{id}`
//!   - `GET|POST /api/cron/usage-check`

use crate::{
    handlers::{
        admin_handlers::{delete_inspiration, usage, usage_check},
        health_handlers::{healthz, readyz},
        inspiration_handlers::{
            features, generate_description, get_media, leaderboard, list_inspirations,
            submit_inspiration, upload_limit, user_profile,
        },
    },
    services::limits::MAX_VIDEO_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

/// Room for the form fields around the largest allowed file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the router for every endpoint, carrying `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/inspirations",
            get(list_inspirations).post(submit_inspiration).layer(DefaultBodyLimit::max(
                MAX_VIDEO_BYTES + MULTIPART_OVERHEAD,
            )),
        )
        .route("/api/inspirations/leaderboard", get(leaderboard))
        .route("/api/inspirations/limit", get(upload_limit))
        .route("/api/users/{email}", get(user_profile))
        .route("/api/features", get(features))
        .route("/api/ai/generate", post(generate_description))
        .route("/api/admin/usage", get(usage))
        .route("/api/admin/inspirations/{id}", delete(delete_inspiration))
        .route("/api/cron/usage-check", get(usage_check).post(usage_check))
        .route("/media/{*key}", get(get_media))
}

/// Full application: routes, request tracing and state.
pub fn app(state: AppState) -> Router {
    routes().layer(TraceLayer::new_for_http()).with_state(state)
}
