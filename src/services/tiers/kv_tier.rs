//! Primary tier: records, leaderboard and profiles in the hosted
//! key-value store.
//!
//! Layout:
//! - `inspirations:uploads`: list of JSON records, newest first
//! - `inspirations:leaderboard`: sorted set, email → karma
//! - `inspirations:user:{email}`: profile hash

use super::{TierError, TierResult, UploadTier};
use crate::{
    clients::kv::KvStore,
    models::{
        leaderboard::{DEFAULT_ROLE, LeaderboardEntry, UserProfile},
        upload::UploadRecord,
    },
    services::leaderboard::rerank,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

const UPLOADS_KEY: &str = "inspirations:uploads";
const LEADERBOARD_KEY: &str = "inspirations:leaderboard";

fn profile_key(email: &str) -> String {
    format!("inspirations:user:{}", email.to_ascii_lowercase())
}

pub struct KvTier {
    kv: Option<Arc<dyn KvStore>>,
}

impl KvTier {
    pub fn new(kv: Option<Arc<dyn KvStore>>) -> Self {
        Self { kv }
    }

    fn store(&self) -> TierResult<&Arc<dyn KvStore>> {
        // Only reachable when the chain skipped the configuration check.
        self.kv.as_ref().ok_or(TierError::NoWritableTier)
    }

    /// Raw list entries paired with their decoded records.
    async fn entries(&self) -> TierResult<Vec<(String, UploadRecord)>> {
        let raw = self.store()?.lrange(UPLOADS_KEY, 0, -1).await?;
        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str::<UploadRecord>(&item) {
                Ok(record) => entries.push((item, record)),
                Err(err) => warn!("skipping malformed upload entry: {}", err),
            }
        }
        Ok(entries)
    }
}

/// A hash whose uploads were all deleted reads as no profile.
fn profile_from_hash(email: &str, hash: &HashMap<String, String>) -> Option<UserProfile> {
    if hash.is_empty() {
        return None;
    }
    let field = |name: &str| hash.get(name).cloned().unwrap_or_default();
    let number = |name: &str| hash.get(name).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
    let role = hash
        .get("role")
        .filter(|r| !r.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());
    Some(UserProfile {
        email: email.to_ascii_lowercase(),
        name: field("name"),
        product: field("product"),
        role,
        karma: number("karma"),
        uploads: u32::try_from(number("uploads")).ok().filter(|n| *n > 0)?,
    })
}

#[async_trait]
impl UploadTier for KvTier {
    fn name(&self) -> &'static str {
        "key-value"
    }

    fn is_configured(&self) -> bool {
        self.kv.is_some()
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn list(&self) -> TierResult<Vec<UploadRecord>> {
        Ok(self.entries().await?.into_iter().map(|(_, r)| r).collect())
    }

    /// Push the record, bump the leaderboard and update the profile hash.
    ///
    /// These are separate commands; concurrent writers for one email race
    /// on the profile with last-write-wins for name/product/role.
    async fn insert(&self, record: &UploadRecord, role: Option<&str>) -> TierResult<()> {
        let kv = self.store()?;
        let raw = serde_json::to_string(record).map_err(|e| TierError::Decode(e.to_string()))?;
        let email = record.uploader_email.to_ascii_lowercase();
        let key = profile_key(&email);

        kv.lpush(UPLOADS_KEY, &raw).await?;
        kv.zincrby(LEADERBOARD_KEY, record.karma_points, &email).await?;

        let mut fields = vec![
            ("email", email.clone()),
            ("name", record.uploader_name.clone()),
            ("product", record.product.clone()),
        ];
        if let Some(role) = role.filter(|r| !r.trim().is_empty()) {
            fields.push(("role", role.trim().to_string()));
        }
        kv.hset(&key, &fields).await?;
        kv.hincrby(&key, "karma", record.karma_points).await?;
        kv.hincrby(&key, "uploads", 1).await?;

        info!("stored upload {} in key-value tier", record.id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> TierResult<Option<UploadRecord>> {
        let kv = self.store()?;
        let Some((raw, record)) = self.entries().await?.into_iter().find(|(_, r)| r.id == id)
        else {
            return Ok(None);
        };

        if kv.lrem(UPLOADS_KEY, 1, &raw).await? == 0 {
            return Ok(None);
        }
        let email = record.uploader_email.to_ascii_lowercase();
        kv.zincrby(LEADERBOARD_KEY, -record.karma_points, &email).await?;
        let key = profile_key(&email);
        kv.hincrby(&key, "karma", -record.karma_points).await?;
        kv.hincrby(&key, "uploads", -1).await?;

        info!("deleted upload {} from key-value tier", id);
        Ok(Some(record))
    }

    async fn leaderboard(&self) -> TierResult<Vec<LeaderboardEntry>> {
        let kv = self.store()?;
        let scores = kv.zrevrange_with_scores(LEADERBOARD_KEY, 0, -1).await?;
        let mut entries = Vec::with_capacity(scores.len());
        for (email, score) in scores {
            let hash = kv.hgetall(&profile_key(&email)).await?;
            let Some(profile) = profile_from_hash(&email, &hash) else {
                continue;
            };
            entries.push(LeaderboardEntry {
                rank: 0,
                name: profile.name,
                category: profile.product,
                uploads: profile.uploads,
                karma: score.round() as i64,
                email,
            });
        }
        rerank(&mut entries);
        Ok(entries)
    }

    async fn profile(&self, email: &str) -> TierResult<Option<UserProfile>> {
        let hash = self.store()?.hgetall(&profile_key(email)).await?;
        Ok(profile_from_hash(email, &hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clients::fakes::MemoryKv,
        models::upload::{MediaKind, UploadStatus},
    };
    use chrono::{Duration, Utc};

    fn record(email: &str, karma: i64, minutes_ago: i64) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            kind: MediaKind::Video,
            media_url: "https://cdn.test/v.mp4".into(),
            thumbnail_url: Some("https://cdn.test/v.jpg".into()),
            uploader_name: "Grace".into(),
            uploader_email: email.into(),
            product: "DatePicker".into(),
            title: "Range selection".into(),
            description: Some("two months side by side".into()),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            karma_points: karma,
            status: UploadStatus::Pending,
        }
    }

    fn tier() -> (Arc<MemoryKv>, KvTier) {
        let kv = Arc::new(MemoryKv::new());
        let tier = KvTier::new(Some(kv.clone() as Arc<dyn KvStore>));
        (kv, tier)
    }

    #[test]
    fn unconfigured_without_client() {
        assert!(!KvTier::new(None).is_configured());
    }

    #[tokio::test]
    async fn insert_updates_list_leaderboard_and_profile() {
        let (_kv, tier) = tier();
        let older = record("grace@example.com", 30, 10);
        let newer = record("grace@example.com", 15, 1);
        tier.insert(&older, Some("designer")).await.unwrap();
        tier.insert(&newer, None).await.unwrap();
        tier.insert(&record("alan@example.com", 50, 0), None).await.unwrap();

        let listed = tier.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[1].id, newer.id);

        let board = tier.leaderboard().await.unwrap();
        assert_eq!(board[0].email, "alan@example.com");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].email, "grace@example.com");
        assert_eq!(board[1].karma, 45);
        assert_eq!(board[1].uploads, 2);
        assert_eq!(board[1].category, "DatePicker");

        let profile = tier.profile("Grace@example.com").await.unwrap().unwrap();
        assert_eq!(profile.role, "designer");
        assert_eq!(profile.karma, 45);
        assert_eq!(profile.uploads, 2);
    }

    #[tokio::test]
    async fn delete_reverses_aggregates() {
        let (_kv, tier) = tier();
        let keep = record("grace@example.com", 10, 5);
        let drop = record("grace@example.com", 25, 1);
        tier.insert(&keep, None).await.unwrap();
        tier.insert(&drop, None).await.unwrap();

        let removed = tier.delete(drop.id).await.unwrap().unwrap();
        assert_eq!(removed.id, drop.id);
        assert!(tier.delete(drop.id).await.unwrap().is_none());

        assert_eq!(tier.list().await.unwrap(), vec![keep]);
        let profile = tier.profile("grace@example.com").await.unwrap().unwrap();
        assert_eq!(profile.karma, 10);
        assert_eq!(profile.uploads, 1);
        assert_eq!(tier.leaderboard().await.unwrap()[0].karma, 10);
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let (kv, tier) = tier();
        kv.lpush(UPLOADS_KEY, "{not json").await.unwrap();
        tier.insert(&record("x@example.com", 10, 0), None).await.unwrap();
        assert_eq!(tier.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_the_last_upload_drops_the_user() {
        let (_kv, tier) = tier();
        let only = record("solo@example.com", 20, 0);
        tier.insert(&only, None).await.unwrap();
        tier.delete(only.id).await.unwrap();

        assert!(tier.leaderboard().await.unwrap().is_empty());
        assert!(tier.profile("solo@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        let (_kv, tier) = tier();
        assert!(tier.profile("ghost@example.com").await.unwrap().is_none());
    }
}
