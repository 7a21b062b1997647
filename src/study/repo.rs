use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flashcard_set_id: Uuid,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub study_options: serde_json::Value,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct StudyResult {
    pub id: Uuid,
    pub study_session_id: Uuid,
    pub flashcard_id: Uuid,
    pub user_answer: String,
    pub is_correct: bool,
    pub attempts: i32,
    pub test_term: bool,
    pub is_multiple_choice: bool,
    pub selected_option: Option<String>,
    pub answered_at: OffsetDateTime,
}

const SESSION_COLUMNS: &str =
    "id, user_id, flashcard_set_id, started_at, completed_at, study_options, created_at";

const RESULT_COLUMNS: &str = "id, study_session_id, flashcard_id, user_answer, is_correct, \
     attempts, test_term, is_multiple_choice, selected_option, answered_at";

pub async fn create_session(
    db: &PgPool,
    user_id: Uuid,
    set_id: Uuid,
    study_options: &serde_json::Value,
    completed: bool,
) -> anyhow::Result<StudySession> {
    let session = sqlx::query_as::<_, StudySession>(&format!(
        r#"
        INSERT INTO study_sessions (user_id, flashcard_set_id, started_at, completed_at, study_options)
        VALUES ($1, $2, now(), CASE WHEN $3 THEN now() END, $4)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(set_id)
    .bind(completed)
    .bind(study_options)
    .fetch_one(db)
    .await?;
    Ok(session)
}

/// Sessions are private: lookups are always scoped to their owner.
pub async fn find_user_session(
    db: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<StudySession>> {
    let session = sqlx::query_as::<_, StudySession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = $1 AND user_id = $2"
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

pub async fn complete_session(
    db: &PgPool,
    session_id: Uuid,
    completed_at: OffsetDateTime,
) -> anyhow::Result<StudySession> {
    let session = sqlx::query_as::<_, StudySession>(&format!(
        r#"
        UPDATE study_sessions SET completed_at = $2
        WHERE id = $1
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(completed_at)
    .fetch_one(db)
    .await?;
    Ok(session)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_result(
    db: &PgPool,
    session_id: Uuid,
    flashcard_id: Uuid,
    user_answer: &str,
    is_correct: bool,
    attempts: i32,
    test_term: bool,
    is_multiple_choice: bool,
    selected_option: Option<&str>,
) -> anyhow::Result<StudyResult> {
    let result = sqlx::query_as::<_, StudyResult>(&format!(
        r#"
        INSERT INTO study_results
            (study_session_id, flashcard_id, user_answer, is_correct, attempts,
             test_term, is_multiple_choice, selected_option, answered_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
        RETURNING {RESULT_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(flashcard_id)
    .bind(user_answer)
    .bind(is_correct)
    .bind(attempts)
    .bind(test_term)
    .bind(is_multiple_choice)
    .bind(selected_option)
    .fetch_one(db)
    .await?;
    Ok(result)
}

pub async fn recent_sessions_for_set(
    db: &PgPool,
    set_id: Uuid,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<StudySession>> {
    let sessions = sqlx::query_as::<_, StudySession>(&format!(
        r#"
        SELECT {SESSION_COLUMNS}
        FROM study_sessions
        WHERE flashcard_set_id = $1 AND user_id = $2
        ORDER BY started_at DESC
        LIMIT $3
        "#
    ))
    .bind(set_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(sessions)
}

pub async fn results_for_sessions(
    db: &PgPool,
    session_ids: &[Uuid],
) -> anyhow::Result<Vec<StudyResult>> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let results = sqlx::query_as::<_, StudyResult>(&format!(
        r#"
        SELECT {RESULT_COLUMNS}
        FROM study_results
        WHERE study_session_id = ANY($1)
        ORDER BY answered_at DESC
        "#
    ))
    .bind(session_ids)
    .fetch_all(db)
    .await?;
    Ok(results)
}
