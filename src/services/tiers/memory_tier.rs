//! In-process list of records, used when no database file is configured.
//! Contents are lost on restart.

use super::{TierResult, UploadTier};
use crate::{
    models::{
        leaderboard::{DEFAULT_ROLE, UserProfile},
        upload::UploadRecord,
    },
    services::leaderboard::profile_from_records,
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

struct StoredUpload {
    record: UploadRecord,
    role: Option<String>,
}

/// Records are kept newest first, each with the role given at submission.
#[derive(Default)]
pub struct MemoryTier {
    uploads: RwLock<Vec<StoredUpload>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn list(&self) -> TierResult<Vec<UploadRecord>> {
        Ok(self
            .uploads
            .read()
            .await
            .iter()
            .map(|u| u.record.clone())
            .collect())
    }

    async fn insert(&self, record: &UploadRecord, role: Option<&str>) -> TierResult<()> {
        let role = role.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        self.uploads.write().await.insert(
            0,
            StoredUpload {
                record: record.clone(),
                role,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> TierResult<Option<UploadRecord>> {
        let mut uploads = self.uploads.write().await;
        Ok(uploads
            .iter()
            .position(|u| u.record.id == id)
            .map(|idx| uploads.remove(idx).record))
    }

    /// Latest non-empty role wins.
    async fn profile(&self, email: &str) -> TierResult<Option<UserProfile>> {
        let uploads = self.uploads.read().await;
        let mine: Vec<&StoredUpload> = uploads
            .iter()
            .filter(|u| u.record.uploader_email.eq_ignore_ascii_case(email))
            .collect();
        let records: Vec<UploadRecord> = mine.iter().map(|u| u.record.clone()).collect();
        let Some(mut profile) = profile_from_records(&records, email) else {
            return Ok(None);
        };
        profile.role = mine
            .iter()
            .find_map(|u| u.role.clone())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());
        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::{MediaKind, UploadStatus};
    use chrono::Utc;

    fn record(email: &str, karma: i64) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            kind: MediaKind::Image,
            media_url: "/media/a.png".into(),
            thumbnail_url: None,
            uploader_name: "Lin".into(),
            uploader_email: email.into(),
            product: "Tooltip".into(),
            title: "Delay".into(),
            description: None,
            created_at: Utc::now(),
            karma_points: karma,
            status: UploadStatus::Pending,
        }
    }

    #[tokio::test]
    async fn insert_list_delete() {
        let tier = MemoryTier::new();
        let first = record("lin@example.com", 15);
        let second = record("lin@example.com", 10);
        tier.insert(&first, None).await.unwrap();
        tier.insert(&second, None).await.unwrap();

        let listed = tier.list().await.unwrap();
        assert_eq!(listed[0].id, second.id);

        assert_eq!(tier.delete(first.id).await.unwrap(), Some(first.clone()));
        assert_eq!(tier.delete(first.id).await.unwrap(), None);
        assert_eq!(tier.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aggregates_are_recomputed_from_records() {
        let tier = MemoryTier::new();
        tier.insert(&record("lin@example.com", 15), None).await.unwrap();
        tier.insert(&record("lin@example.com", 10), None).await.unwrap();
        tier.insert(&record("sam@example.com", 40), None).await.unwrap();

        let board = tier.leaderboard().await.unwrap();
        assert_eq!(board[0].email, "sam@example.com");
        assert_eq!(board[1].karma, 25);

        let profile = tier.profile("lin@example.com").await.unwrap().unwrap();
        assert_eq!(profile.uploads, 2);
        assert_eq!(tier.records_for("sam@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn profile_keeps_the_latest_role() {
        let tier = MemoryTier::new();
        tier.insert(&record("lin@example.com", 15), Some("engineer")).await.unwrap();
        tier.insert(&record("lin@example.com", 10), Some("designer")).await.unwrap();
        tier.insert(&record("lin@example.com", 10), Some("  ")).await.unwrap();
        tier.insert(&record("sam@example.com", 10), None).await.unwrap();

        let lin = tier.profile("lin@example.com").await.unwrap().unwrap();
        assert_eq!(lin.role, "designer");
        assert_eq!(lin.uploads, 3);

        let sam = tier.profile("sam@example.com").await.unwrap().unwrap();
        assert_eq!(sam.role, DEFAULT_ROLE);
    }
}
