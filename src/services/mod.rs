pub mod flags;
pub mod inspiration_service;
pub mod karma;
pub mod leaderboard;
pub mod limits;
pub mod media;
pub mod tiers;
pub mod usage;
