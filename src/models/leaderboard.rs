//! Aggregates derived from upload records.

use serde::{Deserialize, Serialize};

/// One ranked row of the karma leaderboard.
///
/// Never stored directly: rebuilt from records (or the key-value store's
/// sorted set) on every read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub email: String,
    pub name: String,
    pub category: String,
    pub karma: i64,
    #[serde(default)]
    pub uploads: u32,
}

/// Per-uploader aggregate.
///
/// Persisted as a hash in the key-value tier; recomputed from the record
/// list by every other tier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub product: String,
    pub role: String,
    pub karma: i64,
    pub uploads: u32,
}

pub const DEFAULT_ROLE: &str = "contributor";
