use std::sync::LazyLock;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::extractor::AuthUser;
use crate::auth::{password, token};
use crate::db;
use crate::db::users::ProfileChanges;
use crate::error::AppError;
use crate::models::User;
use crate::payload;
use crate::state::SharedState;
use crate::validation::{FieldErrors, FieldReader};

pub const USERNAME_MAX: usize = 150;
pub const NAME_MAX: usize = 150;
pub const EMAIL_MAX: usize = 254;

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn issue_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let payload = payload::parse(&headers, body).await?;

    let mut reader = FieldReader::new(&payload.fields, false);
    let username = reader.text("username", USERNAME_MAX);
    let secret = reader.secret("password");
    reader.into_errors().into_result()?;
    let (Some(username), Some(secret)) = (username, secret) else {
        return Err(AppError::Validation(FieldErrors::single(
            "non_field_errors",
            BAD_CREDENTIALS,
        )));
    };

    if state.login_limiter.check(&username).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let user = db::users::find_by_username(&state.pool, &username).await?;
    let valid = match &user {
        Some(user) => password::verify(&secret, &user.password_hash).map_err(AppError::Internal)?,
        None => password::verify_dummy(&secret),
    };

    // Unknown user, wrong password and inactive account look the same.
    let Some(user) = user.filter(|u| valid && u.is_active) else {
        state.login_limiter.record_failure(&username);
        tracing::info!(%username, "token request rejected");
        return Err(AppError::Validation(FieldErrors::single(
            "non_field_errors",
            BAD_CREDENTIALS,
        )));
    };
    state.login_limiter.reset(&username);

    let removed = db::auth_tokens::delete_expired_for_user(&state.pool, user.id).await?;
    if removed > 0 {
        tracing::debug!(user_id = user.id, removed, "pruned expired tokens");
    }

    let issued = token::generate();
    let expires_at = Utc::now() + Duration::hours(state.config.token_ttl_hours);
    db::auth_tokens::create(&state.pool, user.id, &token::digest(&issued), expires_at).await?;

    tracing::info!(user_id = user.id, "token issued");
    Ok(Json(TokenResponse { token: issued }))
}

/// Revoke the token presented with this request.
pub async fn revoke_token(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<StatusCode, AppError> {
    db::auth_tokens::delete(&state.pool, auth.token_id).await?;
    tracing::info!(user_id = auth.user_id, "token revoked");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<User>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User inactive or deleted.".to_string()))?;
    Ok(Json(user))
}

pub async fn update_me(
    auth: AuthUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<User>, AppError> {
    apply_profile_update(auth, state, headers, body, false).await
}

pub async fn partial_update_me(
    auth: AuthUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<User>, AppError> {
    apply_profile_update(auth, state, headers, body, true).await
}

/// Profile fields the caller may change. Privilege flags are read-only.
pub struct ProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

pub fn validate_profile(fields: &Map<String, Value>, partial: bool) -> (ProfileInput, FieldErrors) {
    let mut reader = FieldReader::new(fields, partial);

    let username = reader.text("username", USERNAME_MAX);
    let username = username.and_then(|u| {
        if USERNAME_RE.is_match(&u) {
            Some(u)
        } else {
            reader.error(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
            None
        }
    });
    let email = reader.blankable_text("email", EMAIL_MAX);
    let email = email.and_then(|e| reader.check_email("email", e));
    let first_name = reader.blankable_text("first_name", NAME_MAX);
    let last_name = reader.blankable_text("last_name", NAME_MAX);
    let password = reader.optional_secret("password").and_then(|p| {
        if p.chars().count() < password::MIN_LENGTH {
            reader.error(
                "password",
                format!(
                    "Ensure this field has at least {} characters.",
                    password::MIN_LENGTH
                ),
            );
            None
        } else {
            Some(p)
        }
    });

    let input = ProfileInput {
        username,
        email,
        first_name,
        last_name,
        password,
    };
    (input, reader.into_errors())
}

async fn apply_profile_update(
    auth: AuthUser,
    state: SharedState,
    headers: HeaderMap,
    body: Bytes,
    partial: bool,
) -> Result<Json<User>, AppError> {
    let payload = payload::parse(&headers, body).await?;

    let (input, mut errors) = validate_profile(&payload.fields, partial);
    if let Some(username) = input.username.as_deref() {
        if db::users::username_taken(&state.pool, username, auth.user_id).await? {
            errors.add("username", "A user with that username already exists.");
        }
    }
    errors.into_result()?;

    let password_changed = input.password.is_some();
    let password_hash = match input.password.as_deref() {
        Some(secret) => Some(password::hash(secret).map_err(AppError::Internal)?),
        None => None,
    };

    let changes = ProfileChanges {
        username: input.username,
        email: input.email,
        first_name: input.first_name,
        last_name: input.last_name,
        password_hash,
    };

    let user = db::users::update_profile(&state.pool, auth.user_id, &changes)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Validation(FieldErrors::single(
                    "username",
                    "A user with that username already exists.",
                ))
            }
            _ => AppError::Database(e),
        })?
        .ok_or_else(|| AppError::Unauthorized("User inactive or deleted.".to_string()))?;

    if password_changed {
        // Other sessions were opened with the old password.
        let revoked =
            db::auth_tokens::delete_others_for_user(&state.pool, user.id, auth.token_id).await?;
        tracing::info!(user_id = user.id, revoked, "password changed");
    }

    tracing::info!(user_id = user.id, partial, "profile updated");
    Ok(Json(user))
}
