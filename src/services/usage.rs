//! Usage estimator.
//!
//! Turns three external quota readings into a [`UsageSnapshot`]. Each
//! reading is a single best-effort attempt: a failing or unconfigured
//! source reads as 0% and never blocks the other two.

use crate::{
    clients::{
        assets::AssetStore,
        kv::{KvStore, info_field},
    },
    models::usage::{UsageSnapshot, clamp_percent},
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SNAPSHOT_CACHE_KEY: &str = "usage:snapshot";
pub const SNAPSHOT_TTL_SECS: u64 = 60 * 60;
const AI_COUNTER_TTL_SECS: u64 = 2 * 24 * 60 * 60;

/// Free-tier limits the raw counters are compared against.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageLimits {
    pub kv_storage_bytes: f64,
    pub kv_commands: f64,
    pub ai_daily_requests: f64,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            kv_storage_bytes: 256.0 * 1024.0 * 1024.0,
            kv_commands: 500_000.0,
            ai_daily_requests: 1_500.0,
        }
    }
}

#[derive(Clone)]
pub struct UsageEstimator {
    assets: Option<Arc<dyn AssetStore>>,
    kv: Option<Arc<dyn KvStore>>,
    limits: UsageLimits,
}

pub fn ai_counter_key(now: DateTime<Utc>) -> String {
    format!("usage:ai:requests:{}", now.format("%Y-%m-%d"))
}

impl UsageEstimator {
    pub fn new(
        assets: Option<Arc<dyn AssetStore>>,
        kv: Option<Arc<dyn KvStore>>,
        limits: UsageLimits,
    ) -> Self {
        Self { assets, kv, limits }
    }

    /// Query all three sources concurrently and build a fresh snapshot.
    pub async fn snapshot(&self) -> UsageSnapshot {
        let (storage, kv, ai) = tokio::join!(
            self.object_storage_percent(),
            self.kv_percent(),
            self.ai_percent(Utc::now()),
        );

        UsageSnapshot::new(
            degrade("object storage", storage),
            degrade("key-value store", kv),
            degrade("AI quota", ai),
        )
    }

    /// Serve the cached snapshot when present, otherwise compute and cache.
    pub async fn cached_snapshot(&self) -> UsageSnapshot {
        if let Some(kv) = &self.kv {
            match kv.get(SNAPSHOT_CACHE_KEY).await {
                Ok(Some(raw)) => match serde_json::from_str::<UsageSnapshot>(&raw) {
                    Ok(snapshot) => {
                        debug!("serving cached usage snapshot from {}", snapshot.checked_at);
                        return snapshot;
                    }
                    Err(err) => warn!("discarding unreadable usage cache: {}", err),
                },
                Ok(None) => debug!("usage cache miss"),
                Err(err) => warn!("usage cache read failed: {}", err),
            }
        }
        self.refresh().await
    }

    /// Recompute the snapshot and write it through to the cache.
    pub async fn refresh(&self) -> UsageSnapshot {
        let snapshot = self.snapshot().await;
        if let Some(kv) = &self.kv {
            match serde_json::to_string(&snapshot) {
                Ok(raw) => {
                    if let Err(err) = kv.set_ex(SNAPSHOT_CACHE_KEY, &raw, SNAPSHOT_TTL_SECS).await {
                        warn!("failed to cache usage snapshot: {}", err);
                    }
                }
                Err(err) => warn!("failed to encode usage snapshot: {}", err),
            }
        }
        snapshot
    }

    /// Count one AI request against today's quota.
    pub async fn record_ai_request(&self) -> Result<i64> {
        let kv = self
            .kv
            .as_ref()
            .ok_or_else(|| anyhow!("key-value store not configured"))?;
        let key = ai_counter_key(Utc::now());
        let count = kv.incr(&key).await?;
        if count == 1 {
            kv.expire(&key, AI_COUNTER_TTL_SECS).await?;
        }
        Ok(count)
    }

    async fn object_storage_percent(&self) -> Result<f64> {
        let Some(assets) = &self.assets else {
            return Ok(0.0);
        };
        Ok(assets.usage_percent().await?)
    }

    async fn kv_percent(&self) -> Result<f64> {
        let Some(kv) = &self.kv else {
            return Ok(0.0);
        };
        let info = kv.info().await?;
        let memory = info_field(&info, "used_memory").context("INFO has no used_memory")?;
        let commands = info_field(&info, "total_commands_processed").unwrap_or(0.0);
        Ok(ratio(memory, self.limits.kv_storage_bytes).max(ratio(commands, self.limits.kv_commands)))
    }

    async fn ai_percent(&self, now: DateTime<Utc>) -> Result<f64> {
        let Some(kv) = &self.kv else {
            return Ok(0.0);
        };
        let count = match kv.get(&ai_counter_key(now)).await? {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("parsing AI request counter `{}`", raw))?,
            None => 0.0,
        };
        Ok(ratio(count, self.limits.ai_daily_requests))
    }
}

fn ratio(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        clamp_percent(used / limit * 100.0)
    }
}

fn degrade(metric: &str, reading: Result<f64>) -> f64 {
    match reading {
        Ok(value) => value,
        Err(err) => {
            warn!("{} usage check failed, reporting 0%: {:#}", metric, err);
            0.0
        }
    }
}
