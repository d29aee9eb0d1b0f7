//! Derives feature gates from a usage snapshot.
//!
//! A gate closes once any metric governing it reaches 100%. Between 90%
//! and 100% the gate stays open but carries a warning reason. The
//! resolver is a pure function with no hysteresis.

use crate::models::usage::{FeatureFlag, FeatureFlagSet, UsageSnapshot};

pub const WARNING_THRESHOLD: f64 = 90.0;
pub const LIMIT_THRESHOLD: f64 = 100.0;

const UPLOADS_DISABLED_MESSAGE: &str =
    "Uploads are temporarily paused because a storage quota has been reached. Please try again later.";
const AI_DISABLED_MESSAGE: &str =
    "AI generation is temporarily unavailable because the daily quota has been reached.";

/// Compute both gates for `usage`.
pub fn resolve_flags(usage: &UsageSnapshot) -> FeatureFlagSet {
    FeatureFlagSet {
        uploads: resolve_gate(
            &[
                ("object storage", usage.object_storage),
                ("key-value store", usage.key_value_store),
            ],
            UPLOADS_DISABLED_MESSAGE,
        ),
        ai_generation: resolve_gate(&[("AI quota", usage.ai_quota)], AI_DISABLED_MESSAGE),
    }
}

fn resolve_gate(metrics: &[(&str, f64)], disabled_message: &str) -> FeatureFlag {
    let exhausted: Vec<String> = metrics
        .iter()
        .filter(|(_, value)| *value >= LIMIT_THRESHOLD)
        .map(|(name, value)| describe(name, *value))
        .collect();

    if !exhausted.is_empty() {
        return FeatureFlag {
            enabled: false,
            reason: Some(exhausted.join("; ")),
            message: Some(disabled_message.to_string()),
        };
    }

    let warnings: Vec<String> = metrics
        .iter()
        .filter(|(_, value)| *value >= WARNING_THRESHOLD)
        .map(|(name, value)| describe(name, *value))
        .collect();

    FeatureFlag {
        enabled: true,
        reason: (!warnings.is_empty()).then(|| warnings.join("; ")),
        message: None,
    }
}

fn describe(name: &str, value: f64) -> String {
    format!("{} usage at {:.0}% of free tier", name, value)
}
