// src/jobs/dedup.rs

use sqlx::{PgConnection, PgPool};

use crate::models::stats::{ModuleProgressRow, ReconcileReport};

/// One module-progress entry after merging duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedModule {
    pub module_id: i64,
    pub module_name: String,
    pub questions_attempted: i64,
    pub correct_answers: i64,
    pub incorrect_answers: i64,
    pub time_spent_seconds: i64,
    pub last_attempted: Option<chrono::DateTime<chrono::Utc>>,
}

/// Collapses duplicate module-progress rows into one entry per module.
///
/// Rows without a `module_id` are excluded from merging entirely and do
/// not count towards the returned keyed-row total. Counters are summed
/// across each group; the most recent non-null `last_attempted` wins and
/// the module name is taken from the first row seen.
///
/// Returns the merged entries (sorted by module id for a deterministic
/// write order) and the number of keyed input rows, so the caller can
/// tell whether merging actually shrank anything.
pub fn merge_module_entries(rows: &[ModuleProgressRow]) -> (Vec<MergedModule>, usize) {
    let mut merged: Vec<MergedModule> = Vec::new();
    let mut keyed_rows = 0usize;

    for row in rows {
        let Some(module_id) = row.module_id else {
            continue;
        };
        keyed_rows += 1;

        match merged.iter_mut().find(|m| m.module_id == module_id) {
            Some(entry) => {
                entry.questions_attempted += row.questions_attempted;
                entry.correct_answers += row.correct_answers;
                entry.incorrect_answers += row.incorrect_answers;
                entry.time_spent_seconds += row.time_spent_seconds;
                if row.last_attempted > entry.last_attempted {
                    entry.last_attempted = row.last_attempted;
                }
            }
            None => merged.push(MergedModule {
                module_id,
                module_name: row.module_name.clone(),
                questions_attempted: row.questions_attempted,
                correct_answers: row.correct_answers,
                incorrect_answers: row.incorrect_answers,
                time_spent_seconds: row.time_spent_seconds,
                last_attempted: row.last_attempted,
            }),
        }
    }

    merged.sort_by_key(|m| m.module_id);
    (merged, keyed_rows)
}

/// Deduplicates one user's module progress inside an open transaction.
///
/// Returns `true` if the row count shrank and the rows were rewritten.
/// Rows with a NULL `module_id` are never touched.
pub async fn dedup_user(conn: &mut PgConnection, user_id: i64) -> Result<bool, sqlx::Error> {
    let rows: Vec<ModuleProgressRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, module_id, module_name,
               questions_attempted, correct_answers, incorrect_answers,
               time_spent_seconds, last_attempted
        FROM module_progress
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let (merged, keyed_rows) = merge_module_entries(&rows);

    // Nothing shrank, nothing to persist.
    if merged.len() >= keyed_rows {
        return Ok(false);
    }

    sqlx::query("DELETE FROM module_progress WHERE user_id = $1 AND module_id IS NOT NULL")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for entry in &merged {
        sqlx::query(
            r#"
            INSERT INTO module_progress
                (user_id, module_id, module_name, questions_attempted,
                 correct_answers, incorrect_answers, time_spent_seconds, last_attempted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user_id)
        .bind(entry.module_id)
        .bind(&entry.module_name)
        .bind(entry.questions_attempted)
        .bind(entry.correct_answers)
        .bind(entry.incorrect_answers)
        .bind(entry.time_spent_seconds)
        .bind(entry.last_attempted)
        .execute(&mut *conn)
        .await?;
    }

    Ok(true)
}

/// Full deduplication pass over every user with module-progress rows.
///
/// Each user is processed in its own transaction; a failure on one user
/// is logged and counted, and the pass moves on. Idempotent: a second
/// run over deduplicated data updates nothing.
pub async fn dedup_all(pool: &PgPool) -> Result<ReconcileReport, sqlx::Error> {
    let user_ids: Vec<i64> =
        sqlx::query_scalar("SELECT DISTINCT user_id FROM module_progress ORDER BY user_id")
            .fetch_all(pool)
            .await?;

    let mut report = ReconcileReport::default();

    for user_id in user_ids {
        report.scanned += 1;

        let result = async {
            let mut tx = pool.begin().await?;
            let changed = dedup_user(&mut tx, user_id).await?;
            tx.commit().await?;
            Ok::<bool, sqlx::Error>(changed)
        }
        .await;

        match result {
            Ok(true) => report.updated += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                tracing::error!("Module dedup failed for user {}: {:?}", user_id, e);
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        "Module dedup pass done: {} scanned, {} updated, {} skipped, {} errors",
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
    use chrono::{TimeZone, Utc};

    fn row(
        module_id: Option<i64>,
        attempted: i64,
        correct: i64,
        last_attempted_ts: Option<i64>,
    ) -> ModuleProgressRow {
        ModuleProgressRow {
            id: 0,
            user_id: 1,
            module_id,
            module_name: "Anatomie Générale".to_string(),
            questions_attempted: attempted,
            correct_answers: correct,
            incorrect_answers: attempted - correct,
            time_spent_seconds: attempted * 30,
            last_attempted: last_attempted_ts.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
        }
    }

    #[test]
    fn merges_duplicate_entries_by_summing_counters() {
        let rows = vec![
            row(Some(7), 3, 2, Some(100)),
            row(Some(7), 5, 4, Some(300)),
            row(Some(7), 2, 1, Some(200)),
        ];

        let (merged, keyed) = merge_module_entries(&rows);

        assert_eq!(keyed, 3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].questions_attempted, 10);
        assert_eq!(merged[0].correct_answers, 7);
        assert_eq!(merged[0].incorrect_answers, 3);
        assert_eq!(
            merged[0].last_attempted,
            Some(Utc.timestamp_opt(300, 0).unwrap())
        );
    }

    #[test]
    fn keeps_distinct_modules_apart() {
        let rows = vec![
            row(Some(2), 4, 4, None),
            row(Some(1), 6, 3, None),
            row(Some(2), 1, 0, None),
        ];

        let (merged, keyed) = merge_module_entries(&rows);

        assert_eq!(keyed, 3);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].module_id, 1);
        assert_eq!(merged[0].questions_attempted, 6);
        assert_eq!(merged[1].module_id, 2);
        assert_eq!(merged[1].questions_attempted, 5);
    }

    #[test]
    fn skips_rows_without_module_id() {
        let rows = vec![
            row(None, 9, 9, None),
            row(Some(3), 1, 1, None),
            row(Some(3), 2, 0, None),
        ];

        let (merged, keyed) = merge_module_entries(&rows);

        // The NULL-keyed row is neither merged nor counted.
        assert_eq!(keyed, 2);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].questions_attempted, 3);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let rows = vec![row(Some(5), 3, 2, Some(10)), row(Some(5), 5, 4, Some(20))];
        let (first, keyed) = merge_module_entries(&rows);
        assert!(first.len() < keyed);

        // Feed the merged output back in as if it had been persisted.
        let persisted: Vec<ModuleProgressRow> = first
            .iter()
            .map(|m| ModuleProgressRow {
                id: 0,
                user_id: 1,
                module_id: Some(m.module_id),
                module_name: m.module_name.clone(),
                questions_attempted: m.questions_attempted,
                correct_answers: m.correct_answers,
                incorrect_answers: m.incorrect_answers,
                time_spent_seconds: m.time_spent_seconds,
                last_attempted: m.last_attempted,
            })
            .collect();

        let (second, keyed_again) = merge_module_entries(&persisted);
        assert_eq!(second.len(), keyed_again);
        assert_eq!(second, first);
    }

    #[test]
    fn keeps_most_recent_last_attempted_across_nulls() {
        let rows = vec![
            row(Some(4), 1, 1, None),
            row(Some(4), 1, 0, Some(500)),
            row(Some(4), 1, 1, Some(50)),
        ];

        let (merged, _) = merge_module_entries(&rows);
        assert_eq!(
            merged[0].last_attempted,
            Some(Utc.timestamp_opt(500, 0).unwrap())
        );
    }
}
