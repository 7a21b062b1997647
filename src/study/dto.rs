use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sets::dto::FlashcardDto;
use crate::study::engine::{PlannedCard, StudyOptions};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub study_options: StudyOptions,
}

/// A fresh session plus the server-planned question sequence.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub cards: Vec<PlannedCard>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flashcard_set_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub study_options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResultRequest {
    pub flashcard_id: Uuid,
    #[serde(default)]
    pub user_answer: String,
    pub attempts: Option<i32>,
    pub test_term: bool,
    pub is_multiple_choice: bool,
    pub selected_option: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDto {
    pub id: Uuid,
    pub study_session_id: Uuid,
    pub flashcard_id: Uuid,
    pub user_answer: String,
    pub is_correct: bool,
    pub attempts: i32,
    pub test_term: bool,
    pub is_multiple_choice: bool,
    pub selected_option: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub answered_at: OffsetDateTime,
}

/// Bulk import of an already-played run; study options are stored opaque.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResultsRequest {
    #[serde(default)]
    pub study_options: serde_json::Value,
    pub results: Vec<SubmitResultRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResultsResponse {
    pub success: bool,
    pub study_session_id: Uuid,
    pub results_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWithCardDto {
    #[serde(flatten)]
    pub result: ResultDto,
    pub flashcard: Option<FlashcardDto>,
}

#[derive(Debug, Serialize)]
pub struct SessionWithResultsDto {
    #[serde(flatten)]
    pub session: SessionDto,
    pub results: Vec<ResultWithCardDto>,
}
