//! Shared state handed to every handler.

use crate::{config::AppConfig, services::inspiration_service::InspirationService};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: InspirationService,
    pub config: Arc<AppConfig>,
    /// Present only when the local tier is SQLite-backed.
    pub db: Option<Arc<SqlitePool>>,
}

impl AppState {
    pub fn new(service: InspirationService, config: AppConfig, db: Option<Arc<SqlitePool>>) -> Self {
        Self {
            service,
            config: Arc::new(config),
            db,
        }
    }
}
