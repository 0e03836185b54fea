// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Points credited per correct answer (the "normal" point category).
pub const POINTS_PER_CORRECT_ANSWER: i64 = 1;

/// Points needed to advance one leaderboard level.
pub const POINTS_PER_LEVEL: i64 = 50;

/// Blue points credited per approved explanation.
pub const EXPLANATION_AWARD_POINTS: i64 = 40;

/// Green points credited per approved question report.
pub const REPORT_AWARD_POINTS: i64 = 30;

/// Default number of leaderboard entries returned without an explicit limit.
pub const LEADERBOARD_DEFAULT_LIMIT: usize = 20;

/// Context window around a requested user: entries before / after their rank.
pub const WINDOW_BEFORE: usize = 5;
pub const WINDOW_AFTER: usize = 6;

/// Segmented leaderboard sampling: ranks 1..=10, then blocks of
/// `SEGMENT_SIZE` starting at rank `SEGMENT_SECOND_START` and every
/// `SEGMENT_STEP` ranks after that.
pub const SEGMENT_SIZE: usize = 10;
pub const SEGMENT_SECOND_START: usize = 70;
pub const SEGMENT_STEP: usize = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
        }
    }
}
