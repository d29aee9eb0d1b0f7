//! Leaderboard and profile aggregation over upload records.

use crate::models::{
    leaderboard::{DEFAULT_ROLE, LeaderboardEntry, UserProfile},
    upload::UploadRecord,
};
use std::collections::HashMap;

struct Tally {
    email: String,
    name: String,
    category: String,
    karma: i64,
    uploads: u32,
}

/// Merge a seed leaderboard with freshly listed records.
///
/// Groups by lower-cased email, sums karma, sorts descending (ties by
/// email) and assigns ranks starting at 1. Seed rows contribute their
/// karma and upload count; name and category come from the first row seen
/// for an email, seed rows first.
pub fn merge_leaderboard(seed: &[LeaderboardEntry], records: &[UploadRecord]) -> Vec<LeaderboardEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, Tally> = HashMap::new();

    let mut add = |email: &str, name: &str, category: &str, karma: i64, uploads: u32| {
        let key = email.trim().to_ascii_lowercase();
        let tally = tallies.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Tally {
                email: key,
                name: name.to_string(),
                category: category.to_string(),
                karma: 0,
                uploads: 0,
            }
        });
        tally.karma += karma;
        tally.uploads += uploads;
    };

    for entry in seed {
        add(&entry.email, &entry.name, &entry.category, entry.karma, entry.uploads);
    }
    for record in records {
        add(
            &record.uploader_email,
            &record.uploader_name,
            &record.product,
            record.karma_points,
            1,
        );
    }

    let mut entries: Vec<LeaderboardEntry> = order
        .into_iter()
        .filter_map(|key| tallies.remove(&key))
        .map(|t| LeaderboardEntry {
            rank: 0,
            email: t.email,
            name: t.name,
            category: t.category,
            karma: t.karma,
            uploads: t.uploads,
        })
        .collect();
    rerank(&mut entries);
    entries
}

/// Aggregate a leaderboard from records alone.
pub fn aggregate_leaderboard(records: &[UploadRecord]) -> Vec<LeaderboardEntry> {
    merge_leaderboard(&[], records)
}

/// Sort by karma descending and assign 1-based ranks.
pub fn rerank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| b.karma.cmp(&a.karma).then_with(|| a.email.cmp(&b.email)));
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx + 1;
    }
}

/// Recompute a profile for `email` from the record list.
///
/// Returns `None` when the email has no records.
pub fn profile_from_records(records: &[UploadRecord], email: &str) -> Option<UserProfile> {
    let email = email.trim().to_ascii_lowercase();
    let mine: Vec<&UploadRecord> = records
        .iter()
        .filter(|r| r.uploader_email.eq_ignore_ascii_case(&email))
        .collect();
    // Records are newest first, so the last one is the oldest submission.
    let first = mine.last()?;
    Some(UserProfile {
        email,
        name: first.uploader_name.clone(),
        product: first.product.clone(),
        role: DEFAULT_ROLE.to_string(),
        karma: mine.iter().map(|r| r.karma_points).sum(),
        uploads: mine.len() as u32,
    })
}
