//! Local file-backed tier: a SQLite database next to the service.
//!
//! Rows are only ever inserted or deleted, never updated.

use super::{TierError, TierResult, UploadTier};
use crate::models::{
    leaderboard::{DEFAULT_ROLE, UserProfile},
    upload::UploadRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str = "SELECT id, kind, media_url, thumbnail_url, uploader_name, \
     uploader_email, product, title, description, created_at, karma_points, status \
     FROM uploads";

#[derive(Debug, FromRow)]
struct UploadRow {
    id: String,
    kind: String,
    media_url: String,
    thumbnail_url: Option<String>,
    uploader_name: String,
    uploader_email: String,
    product: String,
    title: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    karma_points: i64,
    status: String,
}

impl TryFrom<UploadRow> for UploadRecord {
    type Error = TierError;

    fn try_from(row: UploadRow) -> Result<Self, Self::Error> {
        Ok(UploadRecord {
            id: Uuid::parse_str(&row.id).map_err(|e| TierError::Decode(e.to_string()))?,
            kind: row.kind.parse().map_err(TierError::Decode)?,
            media_url: row.media_url,
            thumbnail_url: row.thumbnail_url,
            uploader_name: row.uploader_name,
            uploader_email: row.uploader_email,
            product: row.product,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            karma_points: row.karma_points,
            status: row.status.parse().map_err(TierError::Decode)?,
        })
    }
}

/// Apply the schema statement by statement. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

pub struct SqliteTier {
    db: Arc<SqlitePool>,
}

impl SqliteTier {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    async fn query_records(&self, email: Option<&str>) -> TierResult<Vec<UploadRecord>> {
        let rows: Vec<UploadRow> = match email {
            Some(email) => {
                sqlx::query_as(&format!(
                    "{} WHERE uploader_email = ? ORDER BY created_at DESC, id ASC",
                    SELECT_COLUMNS
                ))
                .bind(email.to_ascii_lowercase())
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as(&format!("{} ORDER BY created_at DESC, id ASC", SELECT_COLUMNS))
                    .fetch_all(&*self.db)
                    .await?
            }
        };
        rows.into_iter().map(UploadRecord::try_from).collect()
    }
}

#[async_trait]
impl UploadTier for SqliteTier {
    fn name(&self) -> &'static str {
        "local-file"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn list(&self) -> TierResult<Vec<UploadRecord>> {
        self.query_records(None).await
    }

    async fn records_for(&self, email: &str) -> TierResult<Vec<UploadRecord>> {
        self.query_records(Some(email)).await
    }

    async fn insert(&self, record: &UploadRecord, role: Option<&str>) -> TierResult<()> {
        sqlx::query(
            "INSERT INTO uploads (
                id, kind, media_url, thumbnail_url, uploader_name, uploader_email,
                uploader_role, product, title, description, created_at, karma_points, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.kind.as_str())
        .bind(&record.media_url)
        .bind(&record.thumbnail_url)
        .bind(&record.uploader_name)
        .bind(record.uploader_email.to_ascii_lowercase())
        .bind(role.map(str::trim).filter(|r| !r.is_empty()))
        .bind(&record.product)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.created_at)
        .bind(record.karma_points)
        .bind(record.status.as_str())
        .execute(&*self.db)
        .await?;

        info!("stored upload {} in local file tier", record.id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> TierResult<Option<UploadRecord>> {
        let row: Option<UploadRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&*self.db)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM uploads WHERE id = ?")
            .bind(id.to_string())
            .execute(&*self.db)
            .await?;
        Ok(Some(row.try_into()?))
    }

    async fn profile(&self, email: &str) -> TierResult<Option<UserProfile>> {
        let records = self.records_for(email).await?;
        let Some(mut profile) = crate::services::leaderboard::profile_from_records(&records, email)
        else {
            return Ok(None);
        };

        let role: Option<String> = sqlx::query_scalar::<_, Option<String>>(
            "SELECT uploader_role FROM uploads
             WHERE uploader_email = ? AND uploader_role IS NOT NULL
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email.to_ascii_lowercase())
        .fetch_optional(&*self.db)
        .await?
        .flatten();
        profile.role = role.unwrap_or_else(|| DEFAULT_ROLE.to_string());
        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::{MediaKind, UploadStatus};
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn tier() -> SqliteTier {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        // Applying twice must be harmless.
        run_migrations(&pool).await.unwrap();
        SqliteTier::new(Arc::new(pool))
    }

    fn record(email: &str, karma: i64, minutes_ago: i64) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            kind: MediaKind::Gif,
            media_url: "/media/ab/cd/x.gif".into(),
            thumbnail_url: None,
            uploader_name: "Kim".into(),
            uploader_email: email.into(),
            product: "Slider".into(),
            title: "Snap points".into(),
            description: Some("ticks at every 10%".into()),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            karma_points: karma,
            status: UploadStatus::Pending,
        }
    }

    #[tokio::test]
    async fn rows_round_trip_newest_first() {
        let tier = tier().await;
        let old = record("kim@example.com", 25, 60);
        let new = record("kim@example.com", 20, 1);
        tier.insert(&old, Some("engineer")).await.unwrap();
        tier.insert(&new, None).await.unwrap();

        let listed = tier.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, new.id);
        assert_eq!(listed[1].kind, MediaKind::Gif);
        assert_eq!(listed[1].description.as_deref(), Some("ticks at every 10%"));
    }

    #[tokio::test]
    async fn records_for_filters_by_email() {
        let tier = tier().await;
        tier.insert(&record("kim@example.com", 10, 3), None).await.unwrap();
        tier.insert(&record("lee@example.com", 10, 2), None).await.unwrap();
        assert_eq!(tier.records_for("KIM@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn profile_keeps_latest_role() {
        let tier = tier().await;
        tier.insert(&record("kim@example.com", 10, 30), Some("designer")).await.unwrap();
        tier.insert(&record("kim@example.com", 15, 10), None).await.unwrap();

        let profile = tier.profile("kim@example.com").await.unwrap().unwrap();
        assert_eq!(profile.role, "designer");
        assert_eq!(profile.karma, 25);
        assert_eq!(profile.uploads, 2);
    }

    #[tokio::test]
    async fn delete_returns_removed_row() {
        let tier = tier().await;
        let r = record("kim@example.com", 10, 0);
        tier.insert(&r, None).await.unwrap();

        let removed = tier.delete(r.id).await.unwrap().unwrap();
        assert_eq!(removed.id, r.id);
        assert!(tier.delete(r.id).await.unwrap().is_none());
        assert!(tier.list().await.unwrap().is_empty());
    }
}
