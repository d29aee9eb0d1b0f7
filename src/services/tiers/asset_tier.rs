//! Read-only tier that rebuilds records by listing object storage.
//!
//! Every uploaded asset carries the record's fields in its context, so a
//! folder listing is enough to reconstruct the feed. The static seed list
//! and seed leaderboard are merged in.

use super::{TierResult, UploadTier, seed_tier::SeedData};
use crate::{
    clients::assets::{AssetResource, AssetStore, ResourceType},
    models::{
        leaderboard::LeaderboardEntry,
        upload::{MediaKind, UploadRecord, UploadStatus, sort_newest_first},
    },
    services::leaderboard::merge_leaderboard,
};
use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc};
use tracing::debug;
use uuid::Uuid;

const MAX_LISTED: u32 = 500;

pub struct AssetTier {
    assets: Option<Arc<dyn AssetStore>>,
    seed: Arc<SeedData>,
}

impl AssetTier {
    pub fn new(assets: Option<Arc<dyn AssetStore>>, seed: Arc<SeedData>) -> Self {
        Self { assets, seed }
    }

    /// Records rebuilt from listed assets only, without seed data.
    async fn fresh_records(&self) -> TierResult<Vec<UploadRecord>> {
        let Some(assets) = &self.assets else {
            return Ok(Vec::new());
        };
        let (images, videos) = tokio::join!(
            assets.list(ResourceType::Image, MAX_LISTED),
            assets.list(ResourceType::Video, MAX_LISTED),
        );
        let mut records: Vec<UploadRecord> = images?
            .iter()
            .chain(videos?.iter())
            .filter_map(|resource| record_from_asset(resource, assets.as_ref()))
            .collect();
        debug!("rebuilt {} records from object storage", records.len());
        sort_newest_first(&mut records);
        Ok(records)
    }
}

/// Rebuild a record from an asset's context. Assets without an id or an
/// uploader email were not created by this service and are skipped.
pub fn record_from_asset(resource: &AssetResource, store: &dyn AssetStore) -> Option<UploadRecord> {
    let custom = &resource.context.as_ref()?.custom;
    let text = |key: &str| custom.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let id = Uuid::parse_str(&text("id")?).ok()?;
    let email = text("email")?.to_ascii_lowercase();
    let resource_type = match resource.resource_type.as_deref() {
        Some("video") => ResourceType::Video,
        _ => ResourceType::Image,
    };
    let kind = text("kind")
        .and_then(|k| k.parse::<MediaKind>().ok())
        .unwrap_or(match (resource_type, resource.format.as_deref()) {
            (ResourceType::Video, _) => MediaKind::Video,
            (_, Some("gif")) => MediaKind::Gif,
            _ => MediaKind::Image,
        });

    Some(UploadRecord {
        id,
        kind,
        media_url: resource.secure_url.clone(),
        thumbnail_url: store.thumbnail_url(resource_type, &resource.public_id),
        uploader_name: text("name").unwrap_or_else(|| email.clone()),
        uploader_email: email,
        product: text("product").unwrap_or_default(),
        title: text("title").unwrap_or_default(),
        description: text("description"),
        created_at: resource.created_at,
        karma_points: text("karma").and_then(|k| k.parse().ok()).unwrap_or(0),
        status: text("status")
            .and_then(|s| s.parse::<UploadStatus>().ok())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl UploadTier for AssetTier {
    fn name(&self) -> &'static str {
        "object-storage"
    }

    fn is_configured(&self) -> bool {
        self.assets.is_some()
    }

    async fn list(&self) -> TierResult<Vec<UploadRecord>> {
        let mut records = self.fresh_records().await?;
        let seen: HashSet<Uuid> = records.iter().map(|r| r.id).collect();
        records.extend(
            self.seed
                .records
                .iter()
                .filter(|r| !seen.contains(&r.id))
                .cloned(),
        );
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn leaderboard(&self) -> TierResult<Vec<LeaderboardEntry>> {
        let fresh = self.fresh_records().await?;
        Ok(merge_leaderboard(&self.seed.leaderboard, &fresh))
    }
}
