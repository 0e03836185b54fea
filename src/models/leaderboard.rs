// src/models/leaderboard.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sort key for the leaderboard. Unrecognized strings silently fall back
/// to `TotalPoints` rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    TotalPoints,
    BluePoints,
    GreenPoints,
    Level,
    Percentage,
}

impl SortKey {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("blue_points") | Some("bluePoints") => SortKey::BluePoints,
            Some("green_points") | Some("greenPoints") => SortKey::GreenPoints,
            Some("level") => SortKey::Level,
            Some("percentage") => SortKey::Percentage,
            _ => SortKey::TotalPoints,
        }
    }
}

/// Query parameters accepted by the leaderboard endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub sort_by: Option<String>,
    pub limit: Option<usize>,

    /// When set, the response includes a context window around this user.
    pub user_id: Option<i64>,

    /// Sampled output for rendering a long leaderboard without
    /// transferring it in full.
    pub segmented: Option<bool>,
}

/// Row joined from `user_stats` and `users` before ranking.
#[derive(Debug, Clone, FromRow)]
pub struct LeaderboardSourceRow {
    pub user_id: i64,
    pub username: String,
    pub questions_attempted: i64,
    pub average_score: f64,
    pub normal_points: i64,
    pub blue_points: i64,
    pub green_points: i64,
    pub total_points: i64,
}

/// One ranked leaderboard entry as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub total_points: i64,
    pub normal_points: i64,
    pub blue_points: i64,
    pub green_points: i64,
    pub level: i64,

    /// Share of the whole question bank this user has answered, in [0,100].
    pub percentage: f64,

    pub average_score: f64,
    pub questions_attempted: i64,
}

/// Context window around one user's rank.
#[derive(Debug, Serialize)]
pub struct LeaderboardWindow {
    pub user_rank: usize,
    pub entries: Vec<RankedEntry>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<RankedEntry>,
    pub total_players: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<LeaderboardWindow>,
}
