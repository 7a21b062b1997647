use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // null for OAuth-only accounts
    pub email_verified: Option<OffsetDateTime>,
    pub image: Option<String>,
    pub achievements: serde_json::Value,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, email_verified, image, achievements, created_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password and an unverified email.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, email_verified)
            VALUES ($1, $2, $3, NULL)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn mark_email_verified(db: &PgPool, email: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET email_verified = now() WHERE email = $1")
            .bind(email)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete_by_email(db: &PgPool, email: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn achievements(db: &PgPool, id: Uuid) -> anyhow::Result<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT achievements FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(db)
                .await?;
        Ok(row.map(|(achievements,)| achievements))
    }

    pub async fn set_achievements(
        db: &PgPool,
        id: Uuid,
        achievements: &serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET achievements = $2 WHERE id = $1")
            .bind(id)
            .bind(achievements)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Delete the account with the same cleanup order the app has always used:
    /// owned sets first, then shares received, notifications, and the user row.
    pub async fn delete_account(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM flashcard_sets WHERE owner_id = $1")
            .bind(id)
            .execute(db)
            .await?;
        sqlx::query("DELETE FROM shared_sets WHERE shared_with_id = $1")
            .bind(id)
            .execute(db)
            .await?;
        sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(id)
            .execute(db)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub token: String,
    pub identifier: String,
    pub expires: OffsetDateTime,
}

impl VerificationToken {
    /// Replace any pending tokens for this email with a fresh 24h one.
    pub async fn create(db: &PgPool, email: &str, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
            .bind(email)
            .execute(db)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (token, identifier, expires)
            VALUES ($1, $2, now() + interval '24 hours')
            "#,
        )
        .bind(token)
        .bind(email)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn find(db: &PgPool, token: &str) -> anyhow::Result<Option<VerificationToken>> {
        let row = sqlx::query_as::<_, VerificationToken>(
            "SELECT token, identifier, expires FROM verification_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE token = $1")
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }
}
