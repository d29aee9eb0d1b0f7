//! Core data models for the inspirations service.
//!
//! Upload records are the only stored entity; leaderboard rows, profiles,
//! usage snapshots and feature flags are derived. Everything serializes as
//! camelCase JSON via `serde`.

pub mod leaderboard;
pub mod upload;
pub mod usage;
