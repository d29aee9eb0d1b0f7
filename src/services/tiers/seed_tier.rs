//! Static seed data, the last tier in the chain.
//!
//! Always configured, never writable. Keeps the feed and leaderboard from
//! rendering empty on a fresh deployment.

use super::{TierResult, UploadTier};
use crate::models::{
    leaderboard::LeaderboardEntry,
    upload::{UploadRecord, sort_newest_first},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SEED_JSON: &str = include_str!("../../../data/seed.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    pub records: Vec<UploadRecord>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl SeedData {
    /// Parse the bundled seed file.
    pub fn bundled() -> Result<Self> {
        let mut seed: SeedData =
            serde_json::from_str(SEED_JSON).context("parsing bundled seed data")?;
        sort_newest_first(&mut seed.records);
        crate::services::leaderboard::rerank(&mut seed.leaderboard);
        Ok(seed)
    }
}

pub struct SeedTier {
    seed: Arc<SeedData>,
}

impl SeedTier {
    pub fn new(seed: Arc<SeedData>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl UploadTier for SeedTier {
    fn name(&self) -> &'static str {
        "seed"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn list(&self) -> TierResult<Vec<UploadRecord>> {
        Ok(self.seed.records.clone())
    }

    async fn leaderboard(&self) -> TierResult<Vec<LeaderboardEntry>> {
        Ok(self.seed.leaderboard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_seed_parses_and_is_ordered() {
        let seed = SeedData::bundled().unwrap();
        assert!(!seed.records.is_empty());
        assert!(!seed.leaderboard.is_empty());
        assert!(
            seed.records
                .windows(2)
                .all(|w| w[0].created_at >= w[1].created_at)
        );
        assert_eq!(seed.leaderboard[0].rank, 1);
        assert!(
            seed.leaderboard
                .windows(2)
                .all(|w| w[0].karma >= w[1].karma)
        );
    }

    #[tokio::test]
    async fn seed_tier_is_read_only() {
        let tier = SeedTier::new(Arc::new(SeedData::bundled().unwrap()));
        assert!(tier.is_configured());
        assert!(!tier.is_writable());
        let record = tier.list().await.unwrap()[0].clone();
        assert!(tier.insert(&record, None).await.is_err());
    }
}
