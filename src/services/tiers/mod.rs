//! Storage-tier fallback chain for upload records.
//!
//! Each tier is a strategy behind [`UploadTier`] that reports whether it is
//! configured. The chain walks tiers in priority order:
//!
//! 1. hosted key-value store
//! 2. object-storage listing (read-only)
//! 3. local store (SQLite file, or an in-memory list)
//! 4. static seed (read-only, always configured)
//!
//! Reads take the first configured tier with a non-empty answer. Writes go
//! to the first configured writable tier. Exactly one tier serves a given
//! call; nothing is merged or reconciled across tiers.

pub mod asset_tier;
pub mod kv_tier;
pub mod memory_tier;
pub mod seed_tier;
pub mod sqlite_tier;

use crate::{
    clients::{assets::AssetError, kv::KvError},
    models::{
        leaderboard::{LeaderboardEntry, UserProfile},
        upload::UploadRecord,
    },
    services::leaderboard::{aggregate_leaderboard, profile_from_records},
};
use async_trait::async_trait;
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TierError {
    #[error("{0} tier is read-only")]
    ReadOnly(&'static str),
    #[error("no writable storage tier is configured")]
    NoWritableTier,
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("stored record is malformed: {0}")]
    Decode(String),
}

pub type TierResult<T> = Result<T, TierError>;

/// A backing store for upload records.
///
/// Only `name`, `is_configured` and `list` are mandatory; aggregate reads
/// default to recomputing from `list`, and writes default to read-only.
#[async_trait]
pub trait UploadTier: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Static capability check; unconfigured tiers are never invoked.
    fn is_configured(&self) -> bool;

    fn is_writable(&self) -> bool {
        false
    }

    /// All records, newest first.
    async fn list(&self) -> TierResult<Vec<UploadRecord>>;

    async fn insert(&self, _record: &UploadRecord, _role: Option<&str>) -> TierResult<()> {
        Err(TierError::ReadOnly(self.name()))
    }

    /// Remove a record, returning it if it existed.
    async fn delete(&self, _id: Uuid) -> TierResult<Option<UploadRecord>> {
        Err(TierError::ReadOnly(self.name()))
    }

    async fn records_for(&self, email: &str) -> TierResult<Vec<UploadRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.uploader_email.eq_ignore_ascii_case(email))
            .collect())
    }

    async fn leaderboard(&self) -> TierResult<Vec<LeaderboardEntry>> {
        Ok(aggregate_leaderboard(&self.list().await?))
    }

    async fn profile(&self, email: &str) -> TierResult<Option<UserProfile>> {
        Ok(profile_from_records(&self.records_for(email).await?, email))
    }
}

/// Result of a chain read, tagged with the tier that served it.
#[derive(Debug)]
pub struct TierRead<T> {
    pub tier: &'static str,
    pub value: T,
}

/// Ordered list of tiers evaluated top to bottom.
#[derive(Clone)]
pub struct TierChain {
    tiers: Vec<Arc<dyn UploadTier>>,
}

impl TierChain {
    pub fn new(tiers: Vec<Arc<dyn UploadTier>>) -> Self {
        Self { tiers }
    }

    /// Names of the tiers that are currently configured, in priority order.
    pub fn configured(&self) -> Vec<&'static str> {
        self.tiers
            .iter()
            .filter(|t| t.is_configured())
            .map(|t| t.name())
            .collect()
    }

    /// The tier that receives writes.
    pub fn writer(&self) -> TierResult<Arc<dyn UploadTier>> {
        self.tiers
            .iter()
            .find(|t| t.is_configured() && t.is_writable())
            .cloned()
            .ok_or(TierError::NoWritableTier)
    }

    pub async fn list(&self) -> TierRead<Vec<UploadRecord>> {
        self.first_non_empty(|tier| async move { tier.list().await }, Vec::is_empty)
            .await
    }

    pub async fn leaderboard(&self) -> TierRead<Vec<LeaderboardEntry>> {
        self.first_non_empty(|tier| async move { tier.leaderboard().await }, Vec::is_empty)
            .await
    }

    pub async fn profile(&self, email: &str) -> TierRead<Option<UserProfile>> {
        let email = email.to_string();
        self.first_non_empty(
            move |tier| {
                let email = email.clone();
                async move { tier.profile(&email).await }
            },
            Option::is_none,
        )
        .await
    }

    /// Walk configured tiers until one answers with a non-empty value.
    ///
    /// Tier errors are logged and treated as empty. When every tier comes
    /// up empty the last configured tier's (empty) answer is returned.
    async fn first_non_empty<T, F, Fut>(&self, read: F, is_empty: fn(&T) -> bool) -> TierRead<T>
    where
        T: Default,
        F: Fn(Arc<dyn UploadTier>) -> Fut,
        Fut: Future<Output = TierResult<T>>,
    {
        let mut last = TierRead {
            tier: "none",
            value: T::default(),
        };
        for tier in self.tiers.iter().filter(|t| t.is_configured()) {
            match read(tier.clone()).await {
                Ok(value) if !is_empty(&value) => {
                    debug!("read served by {} tier", tier.name());
                    return TierRead {
                        tier: tier.name(),
                        value,
                    };
                }
                Ok(value) => {
                    debug!("{} tier returned nothing, falling through", tier.name());
                    last = TierRead {
                        tier: tier.name(),
                        value,
                    };
                }
                Err(err) => {
                    warn!("{} tier read failed, falling through: {}", tier.name(), err);
                }
            }
        }
        last
    }
}
