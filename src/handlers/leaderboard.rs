// src/handlers/leaderboard.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::{
        LEADERBOARD_DEFAULT_LIMIT, POINTS_PER_LEVEL, SEGMENT_SECOND_START, SEGMENT_SIZE,
        SEGMENT_STEP, WINDOW_AFTER, WINDOW_BEFORE,
    },
    error::AppError,
    models::leaderboard::{
        LeaderboardParams, LeaderboardResponse, LeaderboardSourceRow, LeaderboardWindow,
        RankedEntry, SortKey,
    },
};

/// Leaderboard level: one level per `POINTS_PER_LEVEL` points, floor
/// division. 149 points -> level 2, 150 -> level 3.
pub fn level_for(total_points: i64) -> i64 {
    total_points / POINTS_PER_LEVEL
}

/// Share of the question bank answered by this user, in [0,100].
/// An empty question bank yields 0, never a division by zero.
pub fn bank_percentage(questions_attempted: i64, total_questions: i64) -> f64 {
    if total_questions <= 0 {
        0.0
    } else {
        questions_attempted as f64 / total_questions as f64 * 100.0
    }
}

fn sort_value(entry: &RankedEntry, key: SortKey) -> f64 {
    match key {
        SortKey::TotalPoints => entry.total_points as f64,
        SortKey::BluePoints => entry.blue_points as f64,
        SortKey::GreenPoints => entry.green_points as f64,
        SortKey::Level => entry.level as f64,
        SortKey::Percentage => entry.percentage,
    }
}

/// Sorts descending by the requested key and assigns dense 1-based ranks.
///
/// Ties on the sort key break on `total_points` descending, then on
/// ascending user id, so a ranking over fixed data is fully deterministic.
pub fn rank_entries(
    rows: Vec<LeaderboardSourceRow>,
    total_questions: i64,
    key: SortKey,
) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = rows
        .into_iter()
        .map(|r| RankedEntry {
            rank: 0,
            user_id: r.user_id,
            username: r.username,
            total_points: r.total_points,
            normal_points: r.normal_points,
            blue_points: r.blue_points,
            green_points: r.green_points,
            level: level_for(r.total_points),
            percentage: bank_percentage(r.questions_attempted, total_questions),
            average_score: r.average_score,
            questions_attempted: r.questions_attempted,
        })
        .collect();

    entries.sort_by(|a, b| {
        sort_value(b, key)
            .total_cmp(&sort_value(a, key))
            .then(b.total_points.cmp(&a.total_points))
            .then(a.user_id.cmp(&b.user_id))
    });

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }

    entries
}

/// Slice of the ranked list around one user: up to `WINDOW_BEFORE`
/// entries above and `WINDOW_AFTER` below, clamped to the list bounds.
/// `None` when the user is not ranked (no window is not an error).
pub fn context_window(entries: &[RankedEntry], user_id: i64) -> Option<LeaderboardWindow> {
    let pos = entries.iter().position(|e| e.user_id == user_id)?;
    let start = pos.saturating_sub(WINDOW_BEFORE);
    let end = (pos + WINDOW_AFTER + 1).min(entries.len());

    Some(LeaderboardWindow {
        user_rank: pos + 1,
        entries: entries[start..end].to_vec(),
    })
}

/// Sampled view of a long leaderboard: the first `SEGMENT_SIZE` entries,
/// then blocks of `SEGMENT_SIZE` starting at rank `SEGMENT_SECOND_START`
/// and every `SEGMENT_STEP` ranks after, until the list runs out.
pub fn segment_entries(entries: &[RankedEntry]) -> Vec<RankedEntry> {
    let mut out: Vec<RankedEntry> = entries.iter().take(SEGMENT_SIZE).cloned().collect();

    let mut start = SEGMENT_SECOND_START - 1;
    while start < entries.len() {
        let end = (start + SEGMENT_SIZE).min(entries.len());
        out.extend_from_slice(&entries[start..end]);
        start += SEGMENT_STEP;
    }

    out
}

/// Ranked leaderboard over all active users.
///
/// `sort_by` falls back to total points for unrecognized values. Ranks
/// are a dense 1..N sequence for this query's snapshot; they are not
/// stable across calls if the underlying data moves.
pub async fn get_leaderboard(
    State(pool): State<PgPool>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<LeaderboardSourceRow> = sqlx::query_as(
        r#"
        SELECT s.user_id, u.username, s.questions_attempted, s.average_score,
               s.normal_points, s.blue_points, s.green_points, s.total_points
        FROM user_stats s
        JOIN users u ON u.id = s.user_id
        WHERE u.is_active
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard rows: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total_questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&pool)
        .await?;

    let key = SortKey::parse(params.sort_by.as_deref());
    let ranked = rank_entries(rows, total_questions, key);

    let window = params
        .user_id
        .and_then(|user_id| context_window(&ranked, user_id));

    let entries = if params.segmented.unwrap_or(false) {
        segment_entries(&ranked)
    } else {
        let limit = params.limit.unwrap_or(LEADERBOARD_DEFAULT_LIMIT);
        ranked.iter().take(limit).cloned().collect()
    };

    Ok(Json(LeaderboardResponse {
        entries,
        total_players: ranked.len(),
        window,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_row(user_id: i64, total_points: i64, attempted: i64) -> LeaderboardSourceRow {
        LeaderboardSourceRow {
            user_id,
            username: format!("user{}", user_id),
            questions_attempted: attempted,
            average_score: 0.0,
            normal_points: total_points,
            blue_points: 0,
            green_points: 0,
            total_points,
        }
    }

    #[test]
    fn level_is_floor_of_fifty_point_steps() {
        assert_eq!(level_for(0), 0);
        assert_eq!(level_for(49), 0);
        assert_eq!(level_for(149), 2);
        assert_eq!(level_for(150), 3);
    }

    #[test]
    fn empty_question_bank_gives_zero_percentage() {
        assert_eq!(bank_percentage(30, 0), 0.0);
        assert_eq!(bank_percentage(30, 120), 25.0);
    }

    #[test]
    fn unknown_sort_key_falls_back_to_total_points() {
        assert_eq!(SortKey::parse(Some("elo_rating")), SortKey::TotalPoints);
        assert_eq!(SortKey::parse(None), SortKey::TotalPoints);
        assert_eq!(SortKey::parse(Some("blue_points")), SortKey::BluePoints);
        assert_eq!(SortKey::parse(Some("percentage")), SortKey::Percentage);
    }

    #[test]
    fn ranks_are_dense_and_ties_break_deterministically() {
        let rows = vec![
            source_row(1, 100, 10),
            source_row(3, 250, 10),
            source_row(2, 250, 10),
        ];

        let ranked = rank_entries(rows, 100, SortKey::TotalPoints);

        assert_eq!(ranked.len(), 3);
        // The two 250-point users take ranks 1 and 2; lower user id first.
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].user_id, 2);
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[1].user_id, 3);
        assert_eq!(ranked[2].rank, 3);
        assert_eq!(ranked[2].user_id, 1);
    }

    #[test]
    fn sorting_by_percentage_uses_attempted_share() {
        let rows = vec![source_row(1, 500, 5), source_row(2, 10, 90)];

        let ranked = rank_entries(rows, 100, SortKey::Percentage);

        assert_eq!(ranked[0].user_id, 2);
        assert_eq!(ranked[0].percentage, 90.0);
        assert_eq!(ranked[1].user_id, 1);
    }

    #[test]
    fn window_is_clamped_at_the_top_of_the_list() {
        let rows: Vec<_> = (1..=20).map(|i| source_row(i, 1000 - i, 10)).collect();
        let ranked = rank_entries(rows, 100, SortKey::TotalPoints);

        // User 2 sits at rank 2: only one entry above, six below.
        let window = context_window(&ranked, 2).unwrap();
        assert_eq!(window.user_rank, 2);
        assert_eq!(window.entries.len(), 8);
        assert_eq!(window.entries[0].rank, 1);
        assert_eq!(window.entries.last().unwrap().rank, 8);
    }

    #[test]
    fn window_in_the_middle_spans_five_before_and_six_after() {
        let rows: Vec<_> = (1..=30).map(|i| source_row(i, 1000 - i, 10)).collect();
        let ranked = rank_entries(rows, 100, SortKey::TotalPoints);

        let window = context_window(&ranked, 15).unwrap();
        assert_eq!(window.user_rank, 15);
        assert_eq!(window.entries.first().unwrap().rank, 10);
        assert_eq!(window.entries.last().unwrap().rank, 21);
    }

    #[test]
    fn window_is_absent_for_unranked_user() {
        let ranked = rank_entries(vec![source_row(1, 10, 1)], 100, SortKey::TotalPoints);
        assert!(context_window(&ranked, 999).is_none());
    }

    #[test]
    fn segmented_output_samples_fixed_rank_blocks() {
        let rows: Vec<_> = (1..=200).map(|i| source_row(i, 10_000 - i, 10)).collect();
        let ranked = rank_entries(rows, 1000, SortKey::TotalPoints);

        let sampled = segment_entries(&ranked);
        let ranks: Vec<usize> = sampled.iter().map(|e| e.rank).collect();

        let mut expected: Vec<usize> = (1..=10).collect();
        expected.extend(70..=79);
        expected.extend(130..=139);
        expected.extend(190..=199);
        assert_eq!(ranks, expected);
    }

    #[test]
    fn segmented_output_stops_at_the_end_of_the_list() {
        let rows: Vec<_> = (1..=75).map(|i| source_row(i, 10_000 - i, 10)).collect();
        let ranked = rank_entries(rows, 1000, SortKey::TotalPoints);

        let sampled = segment_entries(&ranked);
        let ranks: Vec<usize> = sampled.iter().map(|e| e.rank).collect();

        let mut expected: Vec<usize> = (1..=10).collect();
        expected.extend(70..=75);
        assert_eq!(ranks, expected);
    }
}
