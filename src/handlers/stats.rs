// src/handlers/stats.rs

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::{
    config::POINTS_PER_CORRECT_ANSWER,
    error::AppError,
    models::stats::{
        Achievement, AnsweredQuestion, DailyActivity, ModuleProgressRow, ModuleProgressView,
        MyStatsResponse, RecordProgressRequest, UserStats,
    },
    utils::jwt::Claims,
};

/// Lazily creates a zeroed stats row for the user. A missing record is
/// never an error anywhere in this service.
///
/// Fails with a foreign-key violation when the user id is unknown, which
/// callers map to 404.
pub async fn ensure_stats_row(conn: &mut PgConnection, user_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO user_stats (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn fetch_stats(conn: &mut PgConnection, user_id: i64) -> Result<UserStats, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, user_id, questions_attempted, correct_answers, incorrect_answers,
               time_spent_seconds, average_score, normal_points, blue_points,
               green_points, total_points, last_activity_at, created_at
        FROM user_stats
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
}

/// Records one answered question for the current user.
///
/// Everything happens in a single transaction: the per-module entry, the
/// aggregate counters (atomic `x = x + n` increments, no read-modify-write),
/// today's activity row and the answered-question cache. A failure rolls
/// the whole thing back; the caller never observes partial state.
pub async fn record_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RecordProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id();
    let correct_inc: i64 = if payload.is_correct { 1 } else { 0 };
    let incorrect_inc: i64 = 1 - correct_inc;
    let points_inc = correct_inc * POINTS_PER_CORRECT_ANSWER;

    let mut tx = pool.begin().await?;

    ensure_stats_row(&mut tx, user_id).await.map_err(|e| {
        if e.to_string().contains("foreign key") || e.to_string().contains("23503") {
            AppError::NotFound("User not found".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    // Bump exactly one existing entry for this module. Duplicates can
    // exist; the subselect pins the oldest one so increments never fan out.
    let updated = sqlx::query(
        r#"
        UPDATE module_progress SET
            questions_attempted = questions_attempted + 1,
            correct_answers = correct_answers + $3,
            incorrect_answers = incorrect_answers + $4,
            time_spent_seconds = time_spent_seconds + $5,
            last_attempted = NOW()
        WHERE id = (
            SELECT id FROM module_progress
            WHERE user_id = $1 AND module_id = $2
            ORDER BY id
            LIMIT 1
        )
        "#,
    )
    .bind(user_id)
    .bind(payload.module_id)
    .bind(correct_inc)
    .bind(incorrect_inc)
    .bind(payload.time_spent_seconds)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            r#"
            INSERT INTO module_progress
                (user_id, module_id, module_name, questions_attempted,
                 correct_answers, incorrect_answers, time_spent_seconds, last_attempted)
            VALUES ($1, $2, $3, 1, $4, $5, $6, NOW())
            "#,
        )
        .bind(user_id)
        .bind(payload.module_id)
        .bind(&payload.module_name)
        .bind(correct_inc)
        .bind(incorrect_inc)
        .bind(payload.time_spent_seconds)
        .execute(&mut *tx)
        .await?;
    }

    // All SET expressions read the pre-update row, so the recomputed
    // average uses the incremented operands explicitly. Denominator is
    // at least 1 after this statement.
    sqlx::query(
        r#"
        UPDATE user_stats SET
            questions_attempted = questions_attempted + 1,
            correct_answers = correct_answers + $2,
            incorrect_answers = incorrect_answers + $3,
            time_spent_seconds = time_spent_seconds + $4,
            normal_points = normal_points + $5,
            total_points = total_points + $5,
            average_score = (correct_answers + $2)::float8
                            / (questions_attempted + 1)::float8 * 100,
            last_activity_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(correct_inc)
    .bind(incorrect_inc)
    .bind(payload.time_spent_seconds)
    .bind(points_inc)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO weekly_activity
            (user_id, activity_date, questions_attempted, correct_answers, time_spent_seconds)
        VALUES ($1, CURRENT_DATE, 1, $2, $3)
        ON CONFLICT (user_id, activity_date) DO UPDATE SET
            questions_attempted = weekly_activity.questions_attempted + 1,
            correct_answers = weekly_activity.correct_answers + EXCLUDED.correct_answers,
            time_spent_seconds = weekly_activity.time_spent_seconds + EXCLUDED.time_spent_seconds
        "#,
    )
    .bind(user_id)
    .bind(correct_inc)
    .bind(payload.time_spent_seconds)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO answered_questions
            (user_id, question_id, selected_answers, is_verified, is_correct,
             answered_at, exam_id, module_id)
        VALUES ($1, $2, $3, TRUE, $4, NOW(), $5, $6)
        ON CONFLICT (user_id, question_id) DO UPDATE SET
            selected_answers = EXCLUDED.selected_answers,
            is_verified = TRUE,
            is_correct = EXCLUDED.is_correct,
            answered_at = NOW(),
            exam_id = EXCLUDED.exam_id,
            module_id = EXCLUDED.module_id
        "#,
    )
    .bind(user_id)
    .bind(payload.question_id)
    .bind(sqlx::types::Json(&payload.selected_answers))
    .bind(payload.is_correct)
    .bind(payload.exam_id)
    .bind(payload.module_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut conn = pool.acquire().await?;
    let stats = fetch_stats(&mut conn, user_id).await?;

    Ok(Json(stats))
}

/// Returns the current user's full statistics: aggregate counters,
/// per-module progress with derived scores, the last 7 days of activity
/// and earned achievements. Creates a zeroed record on first read.
pub async fn get_my_stats(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let mut conn = pool.acquire().await?;

    ensure_stats_row(&mut conn, user_id).await.map_err(|e| {
        if e.to_string().contains("foreign key") || e.to_string().contains("23503") {
            AppError::NotFound("User not found".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    let stats = fetch_stats(&mut conn, user_id).await?;

    let module_rows: Vec<ModuleProgressRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, module_id, module_name,
               questions_attempted, correct_answers, incorrect_answers,
               time_spent_seconds, last_attempted
        FROM module_progress
        WHERE user_id = $1
        ORDER BY last_attempted DESC NULLS LAST
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let weekly_activity: Vec<DailyActivity> = sqlx::query_as(
        r#"
        SELECT activity_date, questions_attempted, correct_answers,
               time_spent_seconds, exams_completed
        FROM weekly_activity
        WHERE user_id = $1 AND activity_date >= CURRENT_DATE - 6
        ORDER BY activity_date
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let achievements: Vec<Achievement> = sqlx::query_as(
        r#"
        SELECT achievement_id, name, description, earned_at
        FROM achievements
        WHERE user_id = $1
        ORDER BY earned_at
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(MyStatsResponse {
        stats,
        module_progress: module_rows.into_iter().map(ModuleProgressView::from).collect(),
        weekly_activity,
        achievements,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AnswersParams {
    pub exam_id: Option<i64>,
}

/// Returns the current user's cached answers, optionally filtered by
/// exam, so the client can resume an in-progress exam without
/// re-fetching the questions.
pub async fn list_answers(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<AnswersParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let answers: Vec<AnsweredQuestion> = sqlx::query_as(
        r#"
        SELECT question_id, selected_answers, is_verified, is_correct,
               answered_at, exam_id, module_id
        FROM answered_questions
        WHERE user_id = $1 AND ($2::BIGINT IS NULL OR exam_id = $2)
        ORDER BY answered_at DESC
        "#,
    )
    .bind(user_id)
    .bind(params.exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(answers))
}
