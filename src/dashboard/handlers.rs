use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dashboard::{
        achievements::{self, StatsSnapshot},
        dto::DashboardResponse,
        repo,
        service::{
            backfill_completion, compute_stats, current_streak, longest_streak, recent_sets,
            study_dates, weekly_data, ResultData, SessionData,
        },
    },
    state::AppState,
    study::repo as study_repo,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

#[instrument(skip(state))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DashboardResponse>, (StatusCode, String)> {
    let sets = repo::set_overviews(&state.db, user_id)
        .await
        .map_err(internal)?;

    let now = OffsetDateTime::now_utc();
    let session_rows = repo::sessions_since(&state.db, user_id, now - Duration::days(7))
        .await
        .map_err(internal)?;

    let session_ids: Vec<Uuid> = session_rows.iter().map(|s| s.id).collect();
    let result_rows = study_repo::results_for_sessions(&state.db, &session_ids)
        .await
        .map_err(internal)?;

    let mut by_session: HashMap<Uuid, Vec<ResultData>> = HashMap::new();
    for row in result_rows {
        by_session
            .entry(row.study_session_id)
            .or_default()
            .push(ResultData {
                flashcard_id: row.flashcard_id,
                is_correct: row.is_correct,
                answered_at: row.answered_at,
            });
    }

    let mut sessions: Vec<SessionData> = session_rows
        .into_iter()
        .map(|row| SessionData {
            flashcard_set_id: row.flashcard_set_id,
            created_at: row.created_at,
            completed_at: row.completed_at,
            results: by_session.remove(&row.id).unwrap_or_default(),
        })
        .collect();
    backfill_completion(&mut sessions);

    // The streak never takes the dashboard down with it.
    let (streak_days, longest) = match repo::streak_rows(&state.db, user_id).await {
        Ok(rows) => {
            let dates = study_dates(&rows);
            (current_streak(&dates, now.date()), longest_streak(&dates))
        }
        Err(e) => {
            error!(error = %e, %user_id, "streak calculation failed");
            (0, 0)
        }
    };

    let stats = compute_stats(&sets, &sessions, now, streak_days, longest);
    let recent = recent_sets(&sets, &sessions, now);
    let weekly = weekly_data(&sessions, now.date());

    let snapshot = StatsSnapshot {
        total_sets: stats.total_sets,
        streak_days,
        total_study_time_minutes: stats.total_study_time / 60_000,
        average_retention_rate: stats.average_retention_rate,
    };
    if let Err(e) = achievements::check_for_achievements(&state.db, user_id, &snapshot).await {
        warn!(error = %e, %user_id, "achievement evaluation failed");
    }

    Ok(Json(DashboardResponse {
        stats,
        recent_sets: recent,
        weekly_data: weekly,
    }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
