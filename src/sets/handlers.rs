use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{repo::User, AuthUser, MaybeAuthUser},
    sets::{
        dto::{
            CardUpsertRequest, EmbedSetResponse, FlashcardDto, MessageResponse, OwnerDto,
            RatingDto, RatingRequest, RatingSummary, SetDetail, SetDto, SetListQuery,
            SetListResponse, SetListType, SetSummary, ShareRequest, SharedUserDto,
            SuccessResponse, UnshareParams, UpsertSetRequest,
        },
        repo::{self, Flashcard, FlashcardSet, RatingAggregateRow, SetSummaryRow},
    },
    state::AppState,
};

pub fn set_routes() -> Router<AppState> {
    Router::new()
        .route("/sets", get(list_sets).post(create_set))
        .route(
            "/sets/:id",
            get(get_set)
                .put(put_set)
                .delete(delete_set)
                .options(set_preflight),
        )
        .route("/sets/:id/flashcards", get(get_flashcards).put(put_flashcards))
}

pub fn social_routes() -> Router<AppState> {
    Router::new()
        .route("/sets/:id/share", post(share_set).delete(unshare_set))
        .route("/sets/:id/rating", post(rate_set))
        .route("/sets/:id/studying", post(start_studying).delete(stop_studying))
}

// --- assembly helpers ---

fn card_dto(card: Flashcard) -> FlashcardDto {
    FlashcardDto {
        id: card.id,
        term: card.term,
        definition: card.definition,
    }
}

fn set_dto(set: FlashcardSet) -> SetDto {
    SetDto {
        id: set.id,
        title: set.title,
        description: set.description,
        labels: set.labels,
        public: set.public,
        owner_id: set.owner_id,
        created_at: set.created_at,
        updated_at: set.updated_at,
    }
}

type RatingsMap = HashMap<Uuid, (f64, i64)>;

fn ratings_map(rows: Vec<RatingAggregateRow>) -> RatingsMap {
    rows.into_iter()
        .map(|r| (r.flashcard_set_id, (r.average.unwrap_or(0.0), r.count)))
        .collect()
}

fn summarize(
    rows: Vec<SetSummaryRow>,
    ratings: &RatingsMap,
    studying: &HashSet<Uuid>,
) -> Vec<SetSummary> {
    rows.into_iter()
        .map(|row| {
            let (average, count) = ratings.get(&row.id).copied().unwrap_or((0.0, 0));
            SetSummary {
                id: row.id,
                title: row.title,
                description: row.description,
                labels: row.labels,
                public: row.public,
                owner: row.owner_email.map(|email| OwnerDto {
                    name: row.owner_name,
                    email,
                    image: row.owner_image,
                }),
                card_count: row.card_count,
                rating: RatingSummary {
                    average,
                    count,
                    user_rating: None,
                },
                is_studying: studying.contains(&row.id),
                created_at: row.created_at,
                updated_at: row.updated_at,
            }
        })
        .collect()
}

/// Visibility rule shared by the set detail and card read paths.
fn can_view(set: &FlashcardSet, user_id: Uuid, shared_with: &[Uuid]) -> bool {
    set.owner_id.is_none()
        || set.public
        || set.owner_id == Some(user_id)
        || shared_with.contains(&user_id)
}

pub(crate) fn embed_cors(origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_sets(
    State(state): State<AppState>,
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    Query(query): Query<SetListQuery>,
) -> Result<Json<SetListResponse>, (StatusCode, String)> {
    // The `all` view is served identically to everyone, bookmarks not marked.
    if query.list_type == SetListType::All {
        let rows = repo::list_public(&state.db).await.map_err(internal)?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let ratings = ratings_map(
            repo::rating_aggregates(&state.db, &ids)
                .await
                .map_err(internal)?,
        );
        return Ok(Json(SetListResponse {
            sets: summarize(rows, &ratings, &HashSet::new()),
            studying: None,
        }));
    }

    // The personal views degrade to empty lists rather than 401 so that a
    // signed-out library page renders.
    let Some(user_id) = maybe_user else {
        return Ok(Json(SetListResponse {
            sets: Vec::new(),
            studying: (query.list_type == SetListType::Mine).then(Vec::new),
        }));
    };

    let rows = match query.list_type {
        SetListType::Mine => repo::list_owned(&state.db, user_id).await,
        SetListType::Shared => repo::list_shared(&state.db, user_id).await,
        SetListType::Studying => repo::list_studying(&state.db, user_id, false).await,
        SetListType::All => unreachable!("handled above"),
    }
    .map_err(internal)?;

    let studying_ids: HashSet<Uuid> = repo::studying_set_ids(&state.db, user_id)
        .await
        .map_err(internal)?
        .into_iter()
        .collect();

    let mut ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let studying = if query.list_type == SetListType::Mine {
        let studying_rows = repo::list_studying(&state.db, user_id, true)
            .await
            .map_err(internal)?;
        ids.extend(studying_rows.iter().map(|r| r.id));
        Some(studying_rows)
    } else {
        None
    };

    let ratings = ratings_map(
        repo::rating_aggregates(&state.db, &ids)
            .await
            .map_err(internal)?,
    );

    Ok(Json(SetListResponse {
        sets: summarize(rows, &ratings, &studying_ids),
        studying: studying.map(|rows| summarize(rows, &ratings, &studying_ids)),
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpsertSetRequest>,
) -> Result<Json<SetDto>, (StatusCode, String)> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Title is required".to_string()))?;

    let set = repo::create_set(
        &state.db,
        Some(user_id),
        title,
        payload.description.as_deref(),
        payload.labels.as_deref(),
        payload.public.unwrap_or(false),
    )
    .await
    .map_err(internal)?;

    info!(set_id = %set.id, owner = %user_id, "set created");
    Ok(Json(set_dto(set)))
}

#[instrument(skip(state))]
pub async fn get_set(
    State(state): State<AppState>,
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;

    let Some(user_id) = maybe_user else {
        // Anonymous sets stay readable for embedders; anything owned needs a session.
        if set.owner_id.is_none() {
            let cards = repo::cards_for_set(&state.db, id).await.map_err(internal)?;
            let headers = embed_cors(&state.config.embed_origin);
            let body = EmbedSetResponse {
                owner_id: None,
                flashcards: cards.into_iter().map(card_dto).collect(),
            };
            return Ok((headers, Json(body)).into_response());
        }
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    };

    let shared_users = repo::shared_with_users(&state.db, id).await.map_err(internal)?;
    let shared_ids: Vec<Uuid> = shared_users.iter().map(|u| u.id).collect();

    if !can_view(&set, user_id, &shared_ids) {
        warn!(set_id = %id, %user_id, "set access denied");
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    let cards = repo::cards_for_set(&state.db, id).await.map_err(internal)?;
    let is_studying = repo::is_studying(&state.db, id, user_id)
        .await
        .map_err(internal)?;
    let (average, count) = repo::rating_aggregate_for(&state.db, id)
        .await
        .map_err(internal)?;
    let user_rating = repo::user_rating(&state.db, id, user_id)
        .await
        .map_err(internal)?;

    let anonymous = set.owner_id.is_none();
    let detail = SetDetail {
        id: set.id,
        title: set.title,
        description: set.description,
        labels: set.labels,
        public: set.public,
        owner_id: set.owner_id,
        flashcards: cards.into_iter().map(card_dto).collect(),
        shared_with: shared_users
            .into_iter()
            .map(|u| SharedUserDto {
                id: u.id,
                name: u.name,
                email: u.email,
                image: u.image,
            })
            .collect(),
        is_studying,
        rating: RatingSummary {
            average,
            count,
            user_rating: Some(user_rating.unwrap_or(0)),
        },
        created_at: set.created_at,
        updated_at: set.updated_at,
    };

    if anonymous {
        let headers = embed_cors(&state.config.embed_origin);
        return Ok((headers, Json(detail)).into_response());
    }
    Ok(Json(detail).into_response())
}

#[instrument(skip(state, payload))]
pub async fn put_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpsertSetRequest>,
) -> Result<Json<SetDto>, (StatusCode, String)> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Title is required".to_string()))?;

    let existing = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    if existing.owner_id != Some(user_id) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    let set = repo::update_set(
        &state.db,
        id,
        title,
        payload.description.as_deref(),
        payload.labels.as_deref(),
        payload.public.unwrap_or(false),
    )
    .await
    .map_err(internal)?;

    Ok(Json(set_dto(set)))
}

#[instrument(skip(state))]
pub async fn delete_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    if set.owner_id != Some(user_id) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    repo::delete_set(&state.db, id).await.map_err(internal)?;
    info!(set_id = %id, "set deleted");
    Ok(Json(MessageResponse {
        message: "Set deleted successfully".into(),
    }))
}

pub async fn set_preflight(State(state): State<AppState>) -> Response {
    let mut headers = embed_cors(&state.config.embed_origin);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    (StatusCode::NO_CONTENT, headers).into_response()
}

#[instrument(skip(state))]
pub async fn get_flashcards(
    State(state): State<AppState>,
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;

    let anonymous = set.owner_id.is_none();
    match maybe_user {
        None if !anonymous => return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into())),
        None => {}
        Some(user_id) => {
            let shared_ids: Vec<Uuid> = repo::shared_with_users(&state.db, id)
                .await
                .map_err(internal)?
                .iter()
                .map(|u| u.id)
                .collect();
            if !can_view(&set, user_id, &shared_ids) {
                return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
            }
        }
    }

    let cards: Vec<FlashcardDto> = repo::cards_for_set(&state.db, id)
        .await
        .map_err(internal)?
        .into_iter()
        .map(card_dto)
        .collect();

    if anonymous {
        return Ok((embed_cors(&state.config.embed_origin), Json(cards)).into_response());
    }
    Ok(Json(cards).into_response())
}

#[instrument(skip(state, payload))]
pub async fn put_flashcards(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<Vec<CardUpsertRequest>>,
) -> Result<Json<Vec<FlashcardDto>>, (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    if set.owner_id != Some(user_id) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    let cards = repo::replace_cards(&state.db, id, &payload)
        .await
        .map_err(internal)?;
    Ok(Json(cards.into_iter().map(card_dto).collect()))
}

#[instrument(skip(state, payload))]
pub async fn share_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShareRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    if set.owner_id != Some(user_id) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    let target = User::find_by_email(&state.db, payload.email.trim())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if target.id == user_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "You cannot share a set with yourself".into(),
        ));
    }

    let created = repo::add_share(&state.db, id, target.id)
        .await
        .map_err(internal)?;
    if !created {
        return Err((
            StatusCode::BAD_REQUEST,
            "Set already shared with this user".into(),
        ));
    }

    let message = format!("\"{}\" was shared with you", set.title);
    repo::create_notification(&state.db, target.id, &message)
        .await
        .map_err(internal)?;

    info!(set_id = %id, with = %target.id, "set shared");
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

#[instrument(skip(state))]
pub async fn unshare_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<UnshareParams>,
) -> Result<Json<SuccessResponse>, (StatusCode, String)> {
    let set = repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    if set.owner_id != Some(user_id) {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
    }

    repo::remove_share(&state.db, id, params.user_id)
        .await
        .map_err(internal)?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn rate_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<(StatusCode, Json<RatingDto>), (StatusCode, String)> {
    let rating = payload
        .rating
        .filter(|r| (1..=5).contains(r))
        .ok_or((StatusCode::BAD_REQUEST, "Invalid rating value.".to_string()))?;

    repo::find_set(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;

    let stored = repo::upsert_rating(&state.db, id, user_id, rating)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(RatingDto {
            flashcard_set_id: id,
            user_id,
            rating: stored,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn start_studying(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let created = repo::add_studying(&state.db, id, user_id)
        .await
        .map_err(internal)?;

    if created {
        Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })).into_response())
    } else {
        Ok(Json(MessageResponse {
            message: "Already studying this set.".into(),
        })
        .into_response())
    }
}

#[instrument(skip(state))]
pub async fn stop_studying(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, (StatusCode, String)> {
    repo::remove_studying(&state.db, id, user_id)
        .await
        .map_err(internal)?;
    Ok(Json(SuccessResponse { success: true }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn set_with(owner_id: Option<Uuid>, public: bool) -> FlashcardSet {
        FlashcardSet {
            id: Uuid::new_v4(),
            title: "Capitals".into(),
            description: None,
            labels: None,
            public,
            owner_id,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn owner_and_share_recipients_can_view_private_sets() {
        let owner = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let set = set_with(Some(owner), false);

        assert!(can_view(&set, owner, &[]));
        assert!(can_view(&set, friend, &[friend]));
        assert!(!can_view(&set, stranger, &[friend]));
    }

    #[test]
    fn public_and_anonymous_sets_are_open() {
        let anyone = Uuid::new_v4();
        assert!(can_view(&set_with(Some(Uuid::new_v4()), true), anyone, &[]));
        assert!(can_view(&set_with(None, false), anyone, &[]));
    }

    #[test]
    fn summaries_default_missing_ratings_to_zero() {
        let row = SetSummaryRow {
            id: Uuid::new_v4(),
            title: "Physics".into(),
            description: None,
            labels: None,
            public: true,
            owner_id: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            owner_name: None,
            owner_email: None,
            owner_image: None,
            card_count: 3,
        };
        let summaries = summarize(vec![row], &RatingsMap::new(), &HashSet::new());
        assert_eq!(summaries[0].rating.average, 0.0);
        assert_eq!(summaries[0].rating.count, 0);
        assert!(summaries[0].owner.is_none());
        assert_eq!(summaries[0].card_count, 3);
    }

    #[test]
    fn summaries_mark_studying_sets() {
        let id = Uuid::new_v4();
        let row = SetSummaryRow {
            id,
            title: "Chemistry".into(),
            description: None,
            labels: None,
            public: true,
            owner_id: Some(Uuid::new_v4()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            owner_name: Some("Ada".into()),
            owner_email: Some("ada@example.com".into()),
            owner_image: None,
            card_count: 0,
        };
        let studying: HashSet<Uuid> = [id].into_iter().collect();
        let summaries = summarize(vec![row], &RatingsMap::new(), &studying);
        assert!(summaries[0].is_studying);
        assert_eq!(summaries[0].owner.as_ref().unwrap().email, "ada@example.com");
    }
}
