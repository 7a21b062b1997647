use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    ai::{parse_generated_flashcards, ChatMessage, GenerationError},
    sets::{dto::FlashcardDto, handlers::embed_cors, repo as sets_repo},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sets/inference",
            post(infer_set).options(inference_preflight),
        )
        .route("/sets/inference/flashcards", post(infer_flashcards))
        .route("/sets/:id/completion", post(complete_term))
        .route("/sets/:id/worksheet", get(generate_worksheet))
}

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    pub title: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InferenceResponse {
    pub id: Uuid,
    pub flashcards: Vec<FlashcardDto>,
}

#[derive(Debug, Deserialize)]
pub struct FlashcardsTextRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlashcardsTextResponse {
    pub flashcards: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub term: Option<String>,
}

fn generation_error(e: GenerationError) -> (StatusCode, String) {
    match e {
        GenerationError::Upstream(inner) => {
            error!(error = %inner, "completion call failed");
            (StatusCode::BAD_GATEWAY, "Completion call failed".into())
        }
        GenerationError::Parse(inner) => {
            error!(error = %inner, "generated flashcards did not parse");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Model returned unparseable flashcards".into(),
            )
        }
    }
}

pub async fn inference_preflight(State(state): State<AppState>) -> Response {
    let mut headers = embed_cors(&state.config.embed_origin);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    (StatusCode::NO_CONTENT, headers).into_response()
}

/// Bulk-generate a brand new, ownerless set from free-text notes.
#[instrument(skip(state, payload))]
pub async fn infer_set(
    State(state): State<AppState>,
    Json(payload): Json<InferenceRequest>,
) -> Result<Response, (StatusCode, String)> {
    let (Some(title), Some(notes)) = (
        payload.title.filter(|t| !t.trim().is_empty()),
        payload.notes.filter(|n| !n.trim().is_empty()),
    ) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Notes and title are required".into(),
        ));
    };

    let prompt = format!(
        "You are a flashcard generator. You are given the following notes. \
         You must generate flashcards on ALL of the key terms in the notes and \
         return them as a pure JSON array, like an API endpoint.\n\n\
         The notes are:\n\n{notes}\n\n\
         The flashcards should be in the following format:\n\
         [\n  {{\n    \"term\": \"Globalization\",\n    \"definition\": \"The .... of many different countries\"\n  }}\n]"
    );

    let text = state
        .ai
        .chat(&state.config.ai.model, &[ChatMessage::user(prompt)])
        .await
        .map_err(|e| generation_error(GenerationError::Upstream(e)))?;

    let cards = parse_generated_flashcards(&text).map_err(generation_error)?;

    let (set, stored) = sets_repo::create_anonymous_set(&state.db, title.trim(), &cards)
        .await
        .map_err(internal)?;

    info!(set_id = %set.id, cards = stored.len(), "set generated from notes");
    let body = InferenceResponse {
        id: set.id,
        flashcards: stored
            .into_iter()
            .map(|c| FlashcardDto {
                id: c.id,
                term: c.term,
                definition: c.definition,
            })
            .collect(),
    };
    Ok((embed_cors(&state.config.embed_origin), Json(body)).into_response())
}

/// Raw generation with no persistence: returns whatever the model said.
#[instrument(skip(state, payload))]
pub async fn infer_flashcards(
    State(state): State<AppState>,
    Json(payload): Json<FlashcardsTextRequest>,
) -> Result<Json<FlashcardsTextResponse>, (StatusCode, String)> {
    let Some(text) = payload.text.filter(|t| !t.trim().is_empty()) else {
        return Err((StatusCode::BAD_REQUEST, "Text is required".into()));
    };

    let messages = [
        ChatMessage::system(
            "You are a helpful assistant that generates flashcards from a given text. \
             You will return one flashcard per line. The term and definition should be \
             separated by a comma, in the format: term,definition",
        ),
        ChatMessage::system(
            "For example, for the topic 'JavaScript' you would return lines like:\n\
             JavaScript,Programming language\n\
             String,A data type that represents a sequence of characters",
        ),
        ChatMessage::user(text),
    ];

    let flashcards = state
        .ai
        .chat(&state.config.ai.model, &messages)
        .await
        .map_err(|e| generation_error(GenerationError::Upstream(e)))?;

    Ok(Json(FlashcardsTextResponse { flashcards }))
}

/// Autocomplete a definition in the style of the set's existing pairs.
#[instrument(skip(state, payload))]
pub async fn complete_term(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompletionRequest>,
) -> Result<Json<String>, (StatusCode, String)> {
    let Some(term) = payload.term.filter(|t| !t.trim().is_empty()) else {
        return Err((StatusCode::BAD_REQUEST, "Term is required".into()));
    };

    sets_repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;

    let pairs: Vec<String> = sets_repo::cards_for_set(&state.db, id)
        .await
        .map_err(internal)?
        .into_iter()
        .filter(|c| !c.term.is_empty() && !c.definition.is_empty())
        .map(|c| format!("{}:{}", c.term, c.definition))
        .collect();

    let messages = [
        ChatMessage::system(format!(
            "Complete the following term to its definition following the style given here: {}",
            pairs.join("\n")
        )),
        ChatMessage::user(format!(
            "Give me a definition for the term: {term}. In your output only include the definition, no other text."
        )),
    ];

    let definition = state
        .ai
        .chat(&state.config.ai.completion_model, &messages)
        .await
        .map_err(|e| generation_error(GenerationError::Upstream(e)))?;

    Ok(Json(definition))
}

/// Fill-in-the-blank worksheet over the set's cards; the model's text is
/// returned as-is and parsed client-side.
#[instrument(skip(state))]
pub async fn generate_worksheet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<String>, (StatusCode, String)> {
    sets_repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;

    let cards = sets_repo::cards_for_set(&state.db, id)
        .await
        .map_err(internal)?;

    let listing = cards
        .iter()
        .map(|c| format!("{} - {}", c.term, c.definition))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"You are a worksheet generator. You are given a set of flashcards.

The flashcards are:
{listing}

The worksheet should be in the following format:
{{
    "questions": [
        {{
            "id": "1",
            "order": 1,
            "blocks": [
                {{
                    "id": "1",
                    "content": "What is the capital of France?",
                    "type": "text",
                    "order": 1
                }},
                {{
                    "id": "2",
                    "content": "",
                    "type": "blank",
                    "expectedAnswer": "Paris",
                    "order": 2
                }}
            ]
        }}
    ]
}}

Give this in plain code without any other text."#
    );

    let worksheet = state
        .ai
        .chat(&state.config.ai.model, &[ChatMessage::user(prompt)])
        .await
        .map_err(|e| generation_error(GenerationError::Upstream(e)))?;

    Ok(Json(worksheet))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
