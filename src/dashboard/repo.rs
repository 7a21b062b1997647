use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::study::repo::StudySession;

/// Set id/title/size as needed by the dashboard; owned sets come first,
/// studying sets are appended with no dedup between the two lists.
#[derive(Debug, Clone, FromRow)]
pub struct SetOverviewRow {
    pub id: Uuid,
    pub title: String,
    pub card_count: i64,
}

const OVERVIEW_COLUMNS: &str = r#"
    s.id, s.title,
    (SELECT COUNT(*) FROM flashcards f WHERE f.flashcard_set_id = s.id) AS card_count
"#;

pub async fn set_overviews(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SetOverviewRow>> {
    let mut sets = sqlx::query_as::<_, SetOverviewRow>(&format!(
        r#"
        SELECT {OVERVIEW_COLUMNS}
        FROM flashcard_sets s
        WHERE s.owner_id = $1
        ORDER BY s.updated_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let studying = sqlx::query_as::<_, SetOverviewRow>(&format!(
        r#"
        SELECT {OVERVIEW_COLUMNS}
        FROM studying_sets st
        JOIN flashcard_sets s ON s.id = st.flashcard_set_id
        WHERE st.user_id = $1
        ORDER BY st.created_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;

    sets.extend(studying);
    Ok(sets)
}

pub async fn sessions_since(
    db: &PgPool,
    user_id: Uuid,
    cutoff: OffsetDateTime,
) -> anyhow::Result<Vec<StudySession>> {
    let sessions = sqlx::query_as::<_, StudySession>(
        r#"
        SELECT id, user_id, flashcard_set_id, started_at, completed_at, study_options, created_at
        FROM study_sessions
        WHERE user_id = $1 AND created_at >= $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_all(db)
    .await?;
    Ok(sessions)
}

/// Per-session timestamps for the all-time streak scan.
#[derive(Debug, Clone, FromRow)]
pub struct StreakRow {
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub last_answered: Option<OffsetDateTime>,
}

pub async fn streak_rows(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<StreakRow>> {
    let rows = sqlx::query_as::<_, StreakRow>(
        r#"
        SELECT s.created_at, s.completed_at, MAX(r.answered_at) AS last_answered
        FROM study_sessions s
        LEFT JOIN study_results r ON r.study_session_id = s.id
        WHERE s.user_id = $1
        GROUP BY s.id
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
