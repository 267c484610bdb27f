use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{AuthToken, TokenOwner};

pub async fn create(
    pool: &PgPool,
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<AuthToken, sqlx::Error> {
    sqlx::query_as::<_, AuthToken>(
        "INSERT INTO auth_tokens (user_id, token_hash, expires_at)
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

/// Resolve an unexpired token to its owner.
pub async fn find_owner(pool: &PgPool, token_hash: &str) -> Result<Option<TokenOwner>, sqlx::Error> {
    sqlx::query_as::<_, TokenOwner>(
        "SELECT t.id AS token_id, u.id AS user_id, u.username, u.is_superuser, u.is_active
         FROM auth_tokens t
         JOIN users u ON u.id = t.user_id
         WHERE t.token_hash = $1 AND t.expires_at > now()",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM auth_tokens WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_expired_for_user(pool: &PgPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1 AND expires_at <= now()")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Revoke every other session of a user, e.g. after a password change.
pub async fn delete_others_for_user(
    pool: &PgPool,
    user_id: i64,
    keep_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1 AND id <> $2")
        .bind(user_id)
        .bind(keep_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
