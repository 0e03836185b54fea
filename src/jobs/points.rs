// src/jobs/points.rs

use sqlx::{FromRow, PgConnection, PgPool};

use crate::config::POINTS_PER_CORRECT_ANSWER;
use crate::models::stats::ReconcileReport;

/// The point-bearing columns of one `user_stats` row.
#[derive(Debug, Clone, FromRow)]
pub struct PointsRow {
    pub user_id: i64,
    pub correct_answers: i64,
    pub normal_points: i64,
    pub blue_points: i64,
    pub green_points: i64,
    pub total_points: i64,
}

/// Recomputes the derived point fields from the authoritative
/// `correct_answers` counter. Blue and green points are awarded
/// externally and are never touched here.
///
/// Returns `Some((normal_points, total_points))` when the stored values
/// drifted, `None` when the row is already correct.
pub fn expected_points(row: &PointsRow) -> Option<(i64, i64)> {
    let normal = row.correct_answers * POINTS_PER_CORRECT_ANSWER;
    let total = normal + row.blue_points + row.green_points;

    if normal == row.normal_points && total == row.total_points {
        None
    } else {
        Some((normal, total))
    }
}

const SELECT_POINTS: &str = r#"
    SELECT user_id, correct_answers, normal_points,
           blue_points, green_points, total_points
    FROM user_stats
"#;

/// Fixes the point fields of one user's stats row, if it exists.
/// Returns `true` when something was written.
pub async fn fix_user_points(conn: &mut PgConnection, user_id: i64) -> Result<bool, sqlx::Error> {
    let row: Option<PointsRow> =
        sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_POINTS))
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(row) = row else {
        return Ok(false);
    };

    match expected_points(&row) {
        Some((normal, total)) => {
            sqlx::query(
                "UPDATE user_stats SET normal_points = $2, total_points = $3 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(normal)
            .bind(total)
            .execute(&mut *conn)
            .await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Full recalculation pass over every stats row.
///
/// Rows already carrying the correct values are skipped to avoid needless
/// writes. A failure on one row is logged and counted; the pass always
/// continues to the next row. Idempotent and order-independent.
pub async fn recalculate_all(pool: &PgPool) -> Result<ReconcileReport, sqlx::Error> {
    let rows: Vec<PointsRow> = sqlx::query_as(SELECT_POINTS).fetch_all(pool).await?;

    let mut report = ReconcileReport::default();

    for row in rows {
        report.scanned += 1;

        let Some((normal, total)) = expected_points(&row) else {
            report.skipped += 1;
            continue;
        };

        let result = sqlx::query(
            "UPDATE user_stats SET normal_points = $2, total_points = $3 WHERE user_id = $1",
        )
        .bind(row.user_id)
        .bind(normal)
        .bind(total)
        .execute(pool)
        .await;

        match result {
            Ok(_) => report.updated += 1,
            Err(e) => {
                tracing::error!("Points recalculation failed for user {}: {:?}", row.user_id, e);
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        "Points recalculation pass done: {} scanned, {} updated, {} skipped, {} errors",
        report.scanned,
        report.updated,
        report.skipped,
        report.errors
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points_row(correct: i64, normal: i64, blue: i64, green: i64, total: i64) -> PointsRow {
        PointsRow {
            user_id: 1,
            correct_answers: correct,
            normal_points: normal,
            blue_points: blue,
            green_points: green,
            total_points: total,
        }
    }

    #[test]
    fn derives_normal_points_from_correct_answers() {
        let row = points_row(25, 0, 40, 30, 0);
        assert_eq!(expected_points(&row), Some((25, 95)));
    }

    #[test]
    fn leaves_blue_and_green_untouched() {
        // Drifted normal points, awarded points stay as stored.
        let row = points_row(10, 7, 80, 60, 147);
        let (normal, total) = expected_points(&row).unwrap();
        assert_eq!(normal, 10);
        assert_eq!(total, 10 + 80 + 60);
    }

    #[test]
    fn correct_rows_are_skipped() {
        let row = points_row(12, 12, 40, 0, 52);
        assert_eq!(expected_points(&row), None);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let row = points_row(9, 3, 30, 30, 100);
        let (normal, total) = expected_points(&row).unwrap();

        let fixed = points_row(row.correct_answers, normal, row.blue_points, row.green_points, total);
        assert_eq!(expected_points(&fixed), None);
    }

    #[test]
    fn zeroed_record_needs_no_fix() {
        let row = points_row(0, 0, 0, 0, 0);
        assert_eq!(expected_points(&row), None);
    }
}
