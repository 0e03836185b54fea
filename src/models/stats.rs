// src/models/stats.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'user_stats' table: one aggregate row per user.
///
/// Invariants maintained by the handlers and jobs:
/// * `correct_answers + incorrect_answers <= questions_attempted`
/// * `total_points = normal_points + blue_points + green_points`
/// * `normal_points` derives 1:1 from `correct_answers`
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserStats {
    pub id: i64,
    pub user_id: i64,
    pub questions_attempted: i64,
    pub correct_answers: i64,
    pub incorrect_answers: i64,
    pub time_spent_seconds: i64,

    /// `correct_answers / questions_attempted * 100`, 0 when no attempts.
    pub average_score: f64,

    pub normal_points: i64,
    pub blue_points: i64,
    pub green_points: i64,
    pub total_points: i64,
    pub last_activity_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents one 'module_progress' row.
///
/// `module_id` is nullable: legacy rows without one are ignored by the
/// dedup job and never merged.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModuleProgressRow {
    pub id: i64,
    pub user_id: i64,
    pub module_id: Option<i64>,
    pub module_name: String,
    pub questions_attempted: i64,
    pub correct_answers: i64,
    pub incorrect_answers: i64,
    pub time_spent_seconds: i64,
    pub last_attempted: Option<chrono::DateTime<chrono::Utc>>,
}

impl ModuleProgressRow {
    /// Entry-level score, 0 when the module has no attempts.
    pub fn average_score(&self) -> f64 {
        if self.questions_attempted == 0 {
            0.0
        } else {
            self.correct_answers as f64 / self.questions_attempted as f64 * 100.0
        }
    }
}

/// Module progress as returned to clients, with the derived score attached.
#[derive(Debug, Serialize)]
pub struct ModuleProgressView {
    pub module_id: Option<i64>,
    pub module_name: String,
    pub questions_attempted: i64,
    pub correct_answers: i64,
    pub incorrect_answers: i64,
    pub time_spent_seconds: i64,
    pub average_score: f64,
    pub last_attempted: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ModuleProgressRow> for ModuleProgressView {
    fn from(row: ModuleProgressRow) -> Self {
        let average_score = row.average_score();
        Self {
            module_id: row.module_id,
            module_name: row.module_name,
            questions_attempted: row.questions_attempted,
            correct_answers: row.correct_answers,
            incorrect_answers: row.incorrect_answers,
            time_spent_seconds: row.time_spent_seconds,
            average_score,
            last_attempted: row.last_attempted,
        }
    }
}

/// One 'weekly_activity' row: a user's activity on one calendar day.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyActivity {
    pub activity_date: chrono::NaiveDate,
    pub questions_attempted: i64,
    pub correct_answers: i64,
    pub time_spent_seconds: i64,
    pub exams_completed: i64,
}

/// One 'answered_questions' row: the cached answer for one question,
/// used by clients to resume an in-progress exam.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnsweredQuestion {
    pub question_id: i64,
    pub selected_answers: sqlx::types::Json<Vec<String>>,
    pub is_verified: bool,
    pub is_correct: bool,
    pub answered_at: chrono::DateTime<chrono::Utc>,
    pub exam_id: Option<i64>,
    pub module_id: Option<i64>,
}

/// One 'achievements' row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Achievement {
    pub achievement_id: String,
    pub name: String,
    pub description: String,
    pub earned_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for recording one answered question.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordProgressRequest {
    pub module_id: i64,

    #[validate(length(min = 1, max = 200, message = "Module name must be between 1 and 200 characters."))]
    pub module_name: String,

    pub question_id: i64,

    #[serde(default)]
    pub selected_answers: Vec<String>,

    pub is_correct: bool,

    #[validate(range(min = 0, max = 86400, message = "Time spent must be between 0 and 86400 seconds."))]
    pub time_spent_seconds: i64,

    pub exam_id: Option<i64>,
}

/// Aggregated stats response for the current user.
#[derive(Debug, Serialize)]
pub struct MyStatsResponse {
    pub stats: UserStats,
    pub module_progress: Vec<ModuleProgressView>,
    pub weekly_activity: Vec<DailyActivity>,
    pub achievements: Vec<Achievement>,
}

/// Kind of admin-awarded points (point values live in `config`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwardKind {
    /// Approved explanation: blue points.
    Explanation,
    /// Approved question report: green points.
    Report,
}

/// DTO for crediting blue/green points after an approval event.
#[derive(Debug, Deserialize, Validate)]
pub struct AwardPointsRequest {
    pub user_id: i64,
    pub kind: AwardKind,
    #[validate(range(min = 1, max = 1000, message = "Count must be between 1 and 1000."))]
    pub count: i64,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub scanned: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}
