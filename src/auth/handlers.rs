use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, JwtKeys, LoginRequest, MessageResponse, PublicUser, RefreshRequest,
            RegisterRequest, RegisterResponse, ResendVerificationRequest, VerifyParams,
            VerifyResponse,
        },
        repo::{User, VerificationToken},
        services::{
            generate_verification_token, hash_password, is_valid_email, verify_password, AuthUser,
        },
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/delete", delete(delete_account))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn public_user(user: User) -> PublicUser {
    PublicUser {
        id: user.id,
        name: user.name,
        email: user.email,
        image: user.image,
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Name, email, and password are required".into(),
        ));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    if let Ok(Some(_)) = User::find_by_email(&state.db, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err((
            StatusCode::BAD_REQUEST,
            "User with this email already exists".into(),
        ));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;

    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash)
        .await
        .map_err(|e| {
            error!(error = %e, "create user failed");
            internal(e)
        })?;

    // Email must go out before the account is usable. If it cannot be sent the
    // account is rolled back so the address can be registered again.
    let token = generate_verification_token();
    let send_result = match VerificationToken::create(&state.db, &payload.email, &token).await {
        Ok(()) => state.mailer.send_verification(&payload.email, &token).await,
        Err(e) => Err(e),
    };

    if let Err(e) = send_result {
        error!(error = %e, email = %payload.email, "verification email failed, rolling back user");
        if let Err(del) = User::delete_by_email(&state.db, &payload.email).await {
            error!(error = %del, email = %payload.email, "rollback of unverified user failed");
        }
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send verification email. Please check your email configuration or try again later.".into(),
        ));
    }

    info!(user_id = %user.id, email = %user.email, "user registered, verification pending");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message:
                "Account created successfully. Please check your email to verify your account."
                    .into(),
            requires_verification: true,
        }),
    ))
}

#[instrument(skip(state, params))]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let token = params.token.filter(|t| !t.is_empty()).ok_or((
        StatusCode::BAD_REQUEST,
        "Verification token is required".into(),
    ))?;

    let record = VerificationToken::find(&state.db, &token)
        .await
        .map_err(internal)?;

    let record = match record {
        Some(r) if r.expires < time::OffsetDateTime::now_utc() => {
            // Expired tokens are purged on sight.
            VerificationToken::delete(&state.db, &token)
                .await
                .map_err(internal)?;
            None
        }
        other => other,
    };

    let Some(record) = record else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Invalid or expired verification token".into(),
        ));
    };

    User::mark_email_verified(&state.db, &record.identifier)
        .await
        .map_err(internal)?;
    VerificationToken::delete(&state.db, &token)
        .await
        .map_err(internal)?;

    info!(email = %record.identifier, "email verified");
    Ok(Json(VerifyResponse {
        message: "Email verified successfully".into(),
        email: record.identifier,
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    if payload.email.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Email is required".into()));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))?;

    if user.email_verified.is_some() {
        return Err((StatusCode::BAD_REQUEST, "Email is already verified".into()));
    }

    let token = generate_verification_token();
    VerificationToken::create(&state.db, &user.email, &token)
        .await
        .map_err(internal)?;
    state
        .mailer
        .send_verification(&user.email, &token)
        .await
        .map_err(|e| {
            error!(error = %e, email = %user.email, "resend verification email failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification email".into(),
            )
        })?;

    Ok(Json(MessageResponse {
        message: "Verification email sent successfully".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(internal(e));
        }
    };

    // OAuth-only accounts carry no password hash.
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(email = %payload.email, "login without password credential");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    };

    if user.email_verified.is_none() {
        warn!(email = %payload.email, user_id = %user.id, "login before verification");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Please verify your email address before signing in".into(),
        ));
    }

    let ok = verify_password(&payload.password, hash).map_err(internal)?;
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id).map_err(internal)?;
    let refresh_token = keys.sign_refresh(user.id).map_err(internal)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: public_user(user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("{}", e)))?;

    let access_token = keys.sign_access(claims.sub).map_err(internal)?;
    let refresh_token = keys.sign_refresh(claims.sub).map_err(internal)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: public_user(user),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(user_id = %user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;

    Ok(Json(public_user(user)))
}

#[instrument(skip(state))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    User::delete_account(&state.db, user_id)
        .await
        .map_err(internal)?;
    info!(%user_id, "account deleted");
    Ok(Json(MessageResponse {
        message: "Account deleted".into(),
    }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_hides_nothing_it_should_show() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            name: Some("Ada".into()),
            email: "ada@example.com".into(),
            password_hash: Some("secret-hash".into()),
            email_verified: None,
            image: None,
            achievements: serde_json::json!([]),
            created_at: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&public_user(user)).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(json.contains("Ada"));
        assert!(!json.contains("secret-hash"));
    }
}
