use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    sets::{dto::FlashcardDto, repo as sets_repo},
    state::AppState,
    study::{
        dto::{
            BulkResultsRequest, BulkResultsResponse, CompleteSessionRequest, CreateSessionRequest,
            CreateSessionResponse, ResultDto, ResultWithCardDto, SessionDto,
            SessionWithResultsDto, SubmitResultRequest,
        },
        engine,
        repo::{self, StudyResult, StudySession},
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sets/:id/study/session", post(create_session))
        .route("/sets/:id/study/session/:session_id", patch(complete_session))
        .route(
            "/sets/:id/study/session/:session_id/results",
            post(submit_result),
        )
        .route("/sets/:id/study/results", get(list_results).post(bulk_results))
}

fn session_dto(session: StudySession) -> SessionDto {
    SessionDto {
        id: session.id,
        user_id: session.user_id,
        flashcard_set_id: session.flashcard_set_id,
        started_at: session.started_at,
        completed_at: session.completed_at,
        study_options: session.study_options,
    }
}

fn result_dto(result: StudyResult) -> ResultDto {
    ResultDto {
        id: result.id,
        study_session_id: result.study_session_id,
        flashcard_id: result.flashcard_id,
        user_answer: result.user_answer,
        is_correct: result.is_correct,
        attempts: result.attempts,
        test_term: result.test_term,
        is_multiple_choice: result.is_multiple_choice,
        selected_option: result.selected_option,
        answered_at: result.answered_at,
    }
}

#[instrument(skip(state, payload))]
pub async fn create_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(set_id): Path<Uuid>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, String)> {
    let set = sets_repo::accessible_set(&state.db, set_id, user_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Set not found or access denied".to_string(),
        ))?;

    let cards = sets_repo::cards_for_set(&state.db, set.id)
        .await
        .map_err(internal)?;

    // rng is scoped so the handler future stays Send
    let planned = {
        let mut rng = rand::thread_rng();
        engine::plan(&cards, &payload.study_options, &mut rng)
    };

    if planned.is_empty() {
        warn!(%set_id, "study session with no eligible cards");
        return Err((
            StatusCode::BAD_REQUEST,
            "No flashcards with both term and definition found. Please add complete flashcards to this set.".into(),
        ));
    }

    let options_json = serde_json::to_value(&payload.study_options).map_err(internal)?;
    let session = repo::create_session(&state.db, user_id, set.id, &options_json, false)
        .await
        .map_err(internal)?;

    info!(session_id = %session.id, %set_id, cards = planned.len(), "study session started");
    Ok(Json(CreateSessionResponse {
        id: session.id,
        cards: planned,
    }))
}

#[instrument(skip(state, payload))]
pub async fn complete_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((_set_id, session_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<CompleteSessionRequest>,
) -> Result<Json<SessionDto>, (StatusCode, String)> {
    repo::find_user_session(&state.db, session_id, user_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Study session not found or access denied".to_string(),
        ))?;

    let completed_at = payload
        .completed_at
        .unwrap_or_else(OffsetDateTime::now_utc);
    let session = repo::complete_session(&state.db, session_id, completed_at)
        .await
        .map_err(internal)?;

    info!(%session_id, "study session completed");
    Ok(Json(session_dto(session)))
}

#[instrument(skip(state, payload))]
pub async fn submit_result(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((_set_id, session_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SubmitResultRequest>,
) -> Result<Json<ResultDto>, (StatusCode, String)> {
    let session = repo::find_user_session(&state.db, session_id, user_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Study session not found or access denied".to_string(),
        ))?;

    let result = grade_and_store(&state, &session, &payload).await?;
    Ok(Json(result_dto(result)))
}

/// Grading is server-side: the answer is checked against the stored card, not
/// whatever correctness flag a client might send.
async fn grade_and_store(
    state: &AppState,
    session: &StudySession,
    payload: &SubmitResultRequest,
) -> Result<StudyResult, (StatusCode, String)> {
    let card = sets_repo::find_card_in_set(&state.db, session.flashcard_set_id, payload.flashcard_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Flashcard not found in this set".to_string(),
        ))?;

    let target = engine::answer_side(&card, payload.test_term);
    let is_correct = engine::grade(&payload.user_answer, target);

    repo::insert_result(
        &state.db,
        session.id,
        payload.flashcard_id,
        &payload.user_answer,
        is_correct,
        payload.attempts.unwrap_or(1),
        payload.test_term,
        payload.is_multiple_choice,
        payload.selected_option.as_deref(),
    )
    .await
    .map_err(internal)
}

#[instrument(skip(state, payload))]
pub async fn bulk_results(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(set_id): Path<Uuid>,
    Json(payload): Json<BulkResultsRequest>,
) -> Result<Json<BulkResultsResponse>, (StatusCode, String)> {
    let set = sets_repo::accessible_set(&state.db, set_id, user_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Set not found or access denied".to_string(),
        ))?;

    let session = repo::create_session(&state.db, user_id, set.id, &payload.study_options, true)
        .await
        .map_err(internal)?;

    let mut stored = 0usize;
    for result in &payload.results {
        grade_and_store(&state, &session, result).await?;
        stored += 1;
    }

    info!(session_id = %session.id, results = stored, "bulk study results saved");
    Ok(Json(BulkResultsResponse {
        success: true,
        study_session_id: session.id,
        results_count: stored,
    }))
}

#[instrument(skip(state))]
pub async fn list_results(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(set_id): Path<Uuid>,
) -> Result<Json<Vec<SessionWithResultsDto>>, (StatusCode, String)> {
    let sessions = repo::recent_sessions_for_set(&state.db, set_id, user_id, 10)
        .await
        .map_err(internal)?;

    let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    let results = repo::results_for_sessions(&state.db, &session_ids)
        .await
        .map_err(internal)?;

    let card_ids: Vec<Uuid> = results.iter().map(|r| r.flashcard_id).collect();
    let cards: HashMap<Uuid, FlashcardDto> = sets_repo::cards_by_ids(&state.db, &card_ids)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|c| {
            (
                c.id,
                FlashcardDto {
                    id: c.id,
                    term: c.term,
                    definition: c.definition,
                },
            )
        })
        .collect();

    let mut by_session: HashMap<Uuid, Vec<ResultWithCardDto>> = HashMap::new();
    for result in results {
        let flashcard = cards.get(&result.flashcard_id).map(|c| FlashcardDto {
            id: c.id,
            term: c.term.clone(),
            definition: c.definition.clone(),
        });
        by_session
            .entry(result.study_session_id)
            .or_default()
            .push(ResultWithCardDto {
                result: result_dto(result),
                flashcard,
            });
    }

    let response = sessions
        .into_iter()
        .map(|session| {
            let results = by_session.remove(&session.id).unwrap_or_default();
            SessionWithResultsDto {
                session: session_dto(session),
                results,
            }
        })
        .collect();

    Ok(Json(response))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
