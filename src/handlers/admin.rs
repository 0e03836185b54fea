// src/handlers/admin.rs

use axum::{Json, extract::State, response::IntoResponse};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::{EXPLANATION_AWARD_POINTS, REPORT_AWARD_POINTS},
    error::AppError,
    handlers::stats::ensure_stats_row,
    jobs::{dedup, points},
    models::stats::{AwardKind, AwardPointsRequest, ReconcileReport},
};

/// Recomputes normal and total points from the authoritative correct-answer
/// counters, across all users. Admin only.
pub async fn recalculate_points(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let report = points::recalculate_all(&pool).await?;
    Ok(Json(report))
}

/// Collapses duplicate module-progress entries, across all users. Admin only.
pub async fn dedup_modules(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let report = dedup::dedup_all(&pool).await?;
    Ok(Json(report))
}

/// Combined reconciliation: module dedup followed by the points fix,
/// applied to each user's data inside one transaction so a full cleanup
/// costs a single write per user. Admin only.
pub async fn reconcile(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let user_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM user_stats
        UNION
        SELECT user_id FROM module_progress
        ORDER BY user_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut report = ReconcileReport::default();

    for user_id in user_ids {
        report.scanned += 1;

        let result = async {
            let mut tx = pool.begin().await?;
            let deduped = dedup::dedup_user(&mut tx, user_id).await?;
            let repointed = points::fix_user_points(&mut tx, user_id).await?;
            tx.commit().await?;
            Ok::<bool, sqlx::Error>(deduped || repointed)
        }
        .await;

        match result {
            Ok(true) => report.updated += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                tracing::error!("Reconciliation failed for user {}: {:?}", user_id, e);
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        "Reconciliation pass done: {} scanned, {} updated, {} skipped, {} errors",
        report.scanned,
        report.updated,
        report.skipped,
        report.errors
    );

    Ok(Json(report))
}

/// Credits blue or green points after an external approval event
/// (approved explanation / approved question report). The approval
/// decision itself happens outside this service. Admin only.
pub async fn award_points(
    State(pool): State<PgPool>,
    Json(payload): Json<AwardPointsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let delta = match payload.kind {
        AwardKind::Explanation => EXPLANATION_AWARD_POINTS * payload.count,
        AwardKind::Report => REPORT_AWARD_POINTS * payload.count,
    };

    let mut tx = pool.begin().await?;

    ensure_stats_row(&mut tx, payload.user_id).await.map_err(|e| {
        if e.to_string().contains("foreign key") || e.to_string().contains("23503") {
            AppError::NotFound(format!("User {} not found", payload.user_id))
        } else {
            AppError::from(e)
        }
    })?;

    let sql = match payload.kind {
        AwardKind::Explanation => {
            "UPDATE user_stats SET blue_points = blue_points + $2, \
             total_points = total_points + $2 WHERE user_id = $1"
        }
        AwardKind::Report => {
            "UPDATE user_stats SET green_points = green_points + $2, \
             total_points = total_points + $2 WHERE user_id = $1"
        }
    };

    sqlx::query(sql)
        .bind(payload.user_id)
        .bind(delta)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "user_id": payload.user_id,
        "awarded": delta,
    })))
}
