use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Which view of the library to list.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SetListType {
    #[default]
    All,
    Mine,
    Shared,
    Studying,
}

#[derive(Debug, Deserialize)]
pub struct SetListQuery {
    #[serde(default, rename = "type")]
    pub list_type: SetListType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDto {
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<i32>,
}

/// One set as it appears in list views.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: bool,
    pub owner: Option<OwnerDto>,
    pub card_count: i64,
    pub rating: RatingSummary,
    pub is_studying: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct SetListResponse {
    pub sets: Vec<SetSummary>,
    /// Only present for the `mine` view: sets the user studies but does not own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studying: Option<Vec<SetSummary>>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSetRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardDto {
    pub id: Uuid,
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedUserDto {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

/// Full detail view of one set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDetail {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: bool,
    pub owner_id: Option<Uuid>,
    pub flashcards: Vec<FlashcardDto>,
    pub shared_with: Vec<SharedUserDto>,
    pub is_studying: bool,
    pub rating: RatingSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Slim set shape returned from create/update, no relations attached.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDto {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: bool,
    pub owner_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// What anonymous embedders get to see of an ownerless set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSetResponse {
    pub owner_id: Option<Uuid>,
    pub flashcards: Vec<FlashcardDto>,
}

/// Card replacement payload from the set editor: cards without an id are new,
/// stored cards missing from the list are deleted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpsertRequest {
    pub id: Option<Uuid>,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub definition: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnshareParams {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDto {
    pub flashcard_set_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDto {
    pub flashcard_id: Uuid,
    pub holder: Uuid,
    pub expires_in_seconds: u64,
}
