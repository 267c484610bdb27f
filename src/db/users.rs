use sqlx::PgPool;

use crate::models::User;

/// Profile fields a user may change on their own record.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
}

pub async fn create(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    email: &str,
    is_superuser: bool,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash, email, is_superuser)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(username)
    .bind(password_hash)
    .bind(email)
    .bind(is_superuser)
    .fetch_one(pool)
    .await
}

pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn username_taken(
    pool: &PgPool,
    username: &str,
    exclude_id: i64,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
    )
    .bind(username)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn update_profile(
    pool: &PgPool,
    id: i64,
    changes: &ProfileChanges,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users
         SET username = COALESCE($2, username),
             email = COALESCE($3, email),
             first_name = COALESCE($4, first_name),
             last_name = COALESCE($5, last_name),
             password_hash = COALESCE($6, password_hash)
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(changes.username.as_deref())
    .bind(changes.email.as_deref())
    .bind(changes.first_name.as_deref())
    .bind(changes.last_name.as_deref())
    .bind(changes.password_hash.as_deref())
    .fetch_optional(pool)
    .await
}
