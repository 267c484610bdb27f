use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{Map, Value};

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::departments::DepartmentChanges;
use crate::error::AppError;
use crate::models::Department;
use crate::payload;
use crate::state::SharedState;
use crate::validation::{parse_id, FieldErrors, FieldReader};

pub const NAME_MAX: usize = 255;
pub const DESCRIPTION_MAX: usize = 500;

/// Validate a department body. With `partial` unset both fields are required.
pub fn validate(fields: &Map<String, Value>, partial: bool) -> Result<DepartmentChanges, FieldErrors> {
    let mut reader = FieldReader::new(fields, partial);
    let name = reader.text("name", NAME_MAX);
    let description = reader.text("description", DESCRIPTION_MAX);
    reader.into_errors().into_result()?;
    Ok(DepartmentChanges { name, description })
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Department>>, AppError> {
    auth.require_admin()?;
    let departments = db::departments::list(&state.pool).await?;
    Ok(Json(departments))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Department>), AppError> {
    auth.require_admin()?;
    let payload = payload::parse(&headers, body).await?;
    let changes = validate(&payload.fields, false)?;

    let department = db::departments::create(
        &state.pool,
        changes.name.as_deref().unwrap_or_default(),
        changes.description.as_deref().unwrap_or_default(),
    )
    .await?;

    tracing::info!(id = department.id, user = %auth.username, "department created");
    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn get(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Department>, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;
    let department = db::departments::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(department))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Department>, AppError> {
    apply_update(auth, state, id, headers, body, false).await
}

pub async fn partial_update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Department>, AppError> {
    apply_update(auth, state, id, headers, body, true).await
}

async fn apply_update(
    auth: AuthUser,
    state: SharedState,
    id: String,
    headers: HeaderMap,
    body: Bytes,
    partial: bool,
) -> Result<Json<Department>, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;

    // Unknown ids are a 404 even when the body is also invalid.
    if !db::departments::exists(&state.pool, id).await? {
        return Err(AppError::not_found());
    }
    let payload = payload::parse(&headers, body).await?;
    let changes = validate(&payload.fields, partial)?;

    let department = db::departments::update(&state.pool, id, &changes)
        .await?
        .ok_or_else(AppError::not_found)?;

    tracing::info!(id, user = %auth.username, partial, "department updated");
    Ok(Json(department))
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;

    let deleted = db::departments::delete(&state.pool, id)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::Conflict(
                    "Cannot delete this department because employees still reference it."
                        .to_string(),
                )
            }
            _ => AppError::Database(e),
        })?;

    if !deleted {
        return Err(AppError::not_found());
    }

    tracing::info!(id, user = %auth.username, "department deleted");
    Ok(StatusCode::NO_CONTENT)
}
