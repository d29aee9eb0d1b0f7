//! Usage snapshot and the feature flags derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time utilization of each external service's free tier.
///
/// Every metric is a percentage clamped to `[0, 100]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub object_storage: f64,
    pub key_value_store: f64,
    pub ai_quota: f64,
    pub checked_at: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn new(object_storage: f64, key_value_store: f64, ai_quota: f64) -> Self {
        Self {
            object_storage: clamp_percent(object_storage),
            key_value_store: clamp_percent(key_value_store),
            ai_quota: clamp_percent(ai_quota),
            checked_at: Utc::now(),
        }
    }
}

/// Clamp a raw ratio-derived percentage into `[0, 100]`. NaN reads as 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// A single boolean gate.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeatureFlag {
    pub enabled: bool,

    /// Which metric pushed this gate into the warning or disabled range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// User-facing explanation, only set when the gate is closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSet {
    pub uploads: FeatureFlag,
    pub ai_generation: FeatureFlag,
}
