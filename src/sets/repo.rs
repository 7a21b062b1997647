use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sets::dto::CardUpsertRequest;

#[derive(Debug, Clone, FromRow)]
pub struct FlashcardSet {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: bool,
    pub owner_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Flashcard {
    pub id: Uuid,
    pub term: String,
    pub definition: String,
    pub flashcard_set_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// List-view row: set plus owner projection and card count.
#[derive(Debug, Clone, FromRow)]
pub struct SetSummaryRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub public: bool,
    pub owner_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_image: Option<String>,
    pub card_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct SharedUserRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RatingAggregateRow {
    pub flashcard_set_id: Uuid,
    pub average: Option<f64>,
    pub count: i64,
}

const SET_COLUMNS: &str =
    "id, title, description, labels, public, owner_id, created_at, updated_at";

const SUMMARY_COLUMNS: &str = r#"
    s.id, s.title, s.description, s.labels, s.public, s.owner_id,
    s.created_at, s.updated_at,
    u.name AS owner_name, u.email AS owner_email, u.image AS owner_image,
    (SELECT COUNT(*) FROM flashcards f WHERE f.flashcard_set_id = s.id) AS card_count
"#;

pub async fn list_public(db: &PgPool) -> anyhow::Result<Vec<SetSummaryRow>> {
    let rows = sqlx::query_as::<_, SetSummaryRow>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM flashcard_sets s
        LEFT JOIN users u ON u.id = s.owner_id
        WHERE s.public
        ORDER BY s.updated_at DESC
        "#
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_owned(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SetSummaryRow>> {
    let rows = sqlx::query_as::<_, SetSummaryRow>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM flashcard_sets s
        LEFT JOIN users u ON u.id = s.owner_id
        WHERE s.owner_id = $1
        ORDER BY s.updated_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_shared(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SetSummaryRow>> {
    let rows = sqlx::query_as::<_, SetSummaryRow>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM shared_sets sh
        JOIN flashcard_sets s ON s.id = sh.flashcard_set_id
        LEFT JOIN users u ON u.id = s.owner_id
        WHERE sh.shared_with_id = $1
        ORDER BY sh.created_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Studying sets, optionally excluding sets the user also owns.
pub async fn list_studying(
    db: &PgPool,
    user_id: Uuid,
    exclude_owned: bool,
) -> anyhow::Result<Vec<SetSummaryRow>> {
    let owned_filter = if exclude_owned {
        "AND s.owner_id IS DISTINCT FROM $1"
    } else {
        ""
    };
    let rows = sqlx::query_as::<_, SetSummaryRow>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM studying_sets st
        JOIN flashcard_sets s ON s.id = st.flashcard_set_id
        LEFT JOIN users u ON u.id = s.owner_id
        WHERE st.user_id = $1 {owned_filter}
        ORDER BY st.created_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn studying_set_ids(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT flashcard_set_id FROM studying_sets WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn rating_aggregates(
    db: &PgPool,
    set_ids: &[Uuid],
) -> anyhow::Result<Vec<RatingAggregateRow>> {
    if set_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, RatingAggregateRow>(
        r#"
        SELECT flashcard_set_id, AVG(rating)::float8 AS average, COUNT(*) AS count
        FROM ratings
        WHERE flashcard_set_id = ANY($1)
        GROUP BY flashcard_set_id
        "#,
    )
    .bind(set_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_set(db: &PgPool, id: Uuid) -> anyhow::Result<Option<FlashcardSet>> {
    let set = sqlx::query_as::<_, FlashcardSet>(&format!(
        "SELECT {SET_COLUMNS} FROM flashcard_sets WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(set)
}

/// Set lookup gated on visibility: owner, share recipient, public, or
/// ownerless (anonymous sets are world-readable).
pub async fn accessible_set(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<FlashcardSet>> {
    let set = sqlx::query_as::<_, FlashcardSet>(&format!(
        r#"
        SELECT {SET_COLUMNS}
        FROM flashcard_sets s
        WHERE s.id = $1
          AND (s.owner_id IS NULL
               OR s.public
               OR s.owner_id = $2
               OR EXISTS (SELECT 1 FROM shared_sets sh
                          WHERE sh.flashcard_set_id = s.id AND sh.shared_with_id = $2))
        "#
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(set)
}

pub async fn create_set(
    db: &PgPool,
    owner_id: Option<Uuid>,
    title: &str,
    description: Option<&str>,
    labels: Option<&str>,
    public: bool,
) -> anyhow::Result<FlashcardSet> {
    let set = sqlx::query_as::<_, FlashcardSet>(&format!(
        r#"
        INSERT INTO flashcard_sets (title, description, labels, public, owner_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SET_COLUMNS}
        "#
    ))
    .bind(title)
    .bind(description)
    .bind(labels)
    .bind(public)
    .bind(owner_id)
    .fetch_one(db)
    .await?;
    Ok(set)
}

pub async fn update_set(
    db: &PgPool,
    id: Uuid,
    title: &str,
    description: Option<&str>,
    labels: Option<&str>,
    public: bool,
) -> anyhow::Result<FlashcardSet> {
    let set = sqlx::query_as::<_, FlashcardSet>(&format!(
        r#"
        UPDATE flashcard_sets
        SET title = $2, description = $3, labels = $4, public = $5, updated_at = now()
        WHERE id = $1
        RETURNING {SET_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(labels)
    .bind(public)
    .fetch_one(db)
    .await?;
    Ok(set)
}

pub async fn delete_set(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM flashcard_sets WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn cards_for_set(db: &PgPool, set_id: Uuid) -> anyhow::Result<Vec<Flashcard>> {
    let cards = sqlx::query_as::<_, Flashcard>(
        r#"
        SELECT id, term, definition, flashcard_set_id, created_at
        FROM flashcards
        WHERE flashcard_set_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(set_id)
    .fetch_all(db)
    .await?;
    Ok(cards)
}

pub async fn find_card_in_set(
    db: &PgPool,
    set_id: Uuid,
    card_id: Uuid,
) -> anyhow::Result<Option<Flashcard>> {
    let card = sqlx::query_as::<_, Flashcard>(
        r#"
        SELECT id, term, definition, flashcard_set_id, created_at
        FROM flashcards
        WHERE id = $1 AND flashcard_set_id = $2
        "#,
    )
    .bind(card_id)
    .bind(set_id)
    .fetch_optional(db)
    .await?;
    Ok(card)
}

pub async fn cards_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<Flashcard>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let cards = sqlx::query_as::<_, Flashcard>(
        "SELECT id, term, definition, flashcard_set_id, created_at FROM flashcards WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(cards)
}

/// Editor save: upsert the listed cards, drop everything else in the set.
pub async fn replace_cards(
    db: &PgPool,
    set_id: Uuid,
    cards: &[CardUpsertRequest],
) -> anyhow::Result<Vec<Flashcard>> {
    let keep: Vec<Uuid> = cards.iter().filter_map(|c| c.id).collect();

    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM flashcards WHERE flashcard_set_id = $1 AND NOT (id = ANY($2))")
        .bind(set_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;
    for card in cards {
        match card.id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE flashcards SET term = $3, definition = $4
                    WHERE id = $1 AND flashcard_set_id = $2
                    "#,
                )
                .bind(id)
                .bind(set_id)
                .bind(&card.term)
                .bind(&card.definition)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO flashcards (term, definition, flashcard_set_id) VALUES ($1, $2, $3)",
                )
                .bind(&card.term)
                .bind(&card.definition)
                .bind(set_id)
                .execute(&mut *tx)
                .await?;
            }
        }
    }
    sqlx::query("UPDATE flashcard_sets SET updated_at = now() WHERE id = $1")
        .bind(set_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    cards_for_set(db, set_id).await
}

pub async fn shared_with_users(db: &PgPool, set_id: Uuid) -> anyhow::Result<Vec<SharedUserRow>> {
    let rows = sqlx::query_as::<_, SharedUserRow>(
        r#"
        SELECT u.id, u.name, u.email, u.image
        FROM shared_sets sh
        JOIN users u ON u.id = sh.shared_with_id
        WHERE sh.flashcard_set_id = $1
        ORDER BY sh.created_at ASC
        "#,
    )
    .bind(set_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn is_shared_with(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM shared_sets WHERE flashcard_set_id = $1 AND shared_with_id = $2",
    )
    .bind(set_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

/// Returns false when the share already existed.
pub async fn add_share(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO shared_sets (flashcard_set_id, shared_with_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(set_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_share(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM shared_sets WHERE flashcard_set_id = $1 AND shared_with_id = $2")
        .bind(set_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn create_notification(
    db: &PgPool,
    user_id: Uuid,
    message: &str,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO notifications (user_id, message) VALUES ($1, $2)")
        .bind(user_id)
        .bind(message)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn rating_aggregate_for(db: &PgPool, set_id: Uuid) -> anyhow::Result<(f64, i64)> {
    let row: (Option<f64>, i64) = sqlx::query_as(
        "SELECT AVG(rating)::float8, COUNT(*) FROM ratings WHERE flashcard_set_id = $1",
    )
    .bind(set_id)
    .fetch_one(db)
    .await?;
    Ok((row.0.unwrap_or(0.0), row.1))
}

pub async fn user_rating(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<i32>> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT rating FROM ratings WHERE flashcard_set_id = $1 AND user_id = $2")
            .bind(set_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(rating,)| rating))
}

/// One rating per (set, user): resubmission overwrites, never duplicates.
pub async fn upsert_rating(
    db: &PgPool,
    set_id: Uuid,
    user_id: Uuid,
    rating: i32,
) -> anyhow::Result<i32> {
    let (stored,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO ratings (flashcard_set_id, user_id, rating)
        VALUES ($1, $2, $3)
        ON CONFLICT (flashcard_set_id, user_id)
        DO UPDATE SET rating = EXCLUDED.rating, updated_at = now()
        RETURNING rating
        "#,
    )
    .bind(set_id)
    .bind(user_id)
    .bind(rating)
    .fetch_one(db)
    .await?;
    Ok(stored)
}

pub async fn is_studying(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM studying_sets WHERE flashcard_set_id = $1 AND user_id = $2")
            .bind(set_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    Ok(row.is_some())
}

/// Returns false when the bookmark already existed (duplicate POST is a no-op).
pub async fn add_studying(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO studying_sets (flashcard_set_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(set_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_studying(db: &PgPool, set_id: Uuid, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM studying_sets WHERE flashcard_set_id = $1 AND user_id = $2")
        .bind(set_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Inference endpoint: a set with no owner, created together with its cards.
pub async fn create_anonymous_set(
    db: &PgPool,
    title: &str,
    cards: &[crate::ai::GeneratedFlashcard],
) -> anyhow::Result<(FlashcardSet, Vec<Flashcard>)> {
    let mut tx = db.begin().await?;
    let set = sqlx::query_as::<_, FlashcardSet>(&format!(
        r#"
        INSERT INTO flashcard_sets (title, owner_id)
        VALUES ($1, NULL)
        RETURNING {SET_COLUMNS}
        "#
    ))
    .bind(title)
    .fetch_one(&mut *tx)
    .await?;
    for card in cards {
        sqlx::query("INSERT INTO flashcards (term, definition, flashcard_set_id) VALUES ($1, $2, $3)")
            .bind(&card.term)
            .bind(&card.definition)
            .bind(set.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    let cards = cards_for_set(db, set.id).await?;
    Ok((set, cards))
}
