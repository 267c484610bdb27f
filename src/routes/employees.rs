use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::employees::{EmployeeChanges, NewEmployee};
use crate::error::AppError;
use crate::media::{self, ValidatedImage};
use crate::models::{Employee, EmployeeDetail};
use crate::payload::{self, Payload};
use crate::state::SharedState;
use crate::validation::{parse_id, FieldErrors, FieldReader};

pub const NAME_MAX: usize = 255;
pub const EMAIL_MAX: usize = 255;
pub const SALARY_DIGITS: u32 = 7;
pub const SALARY_PLACES: u32 = 2;

const NOT_A_FILE: &str = "The submitted data was not a file. Check the encoding type on the form.";
const EMAIL_TAKEN: &str = "employee with this email already exists.";

/// Wire representation of an employee. Reads carry the department's name,
/// writes echo back its identifier.
#[derive(Debug, Serialize)]
pub struct EmployeeView<D> {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub salary: Decimal,
    pub picture: Option<String>,
    pub hired_at: Option<DateTime<Utc>>,
    pub department: D,
    pub is_manager: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read shape, used by list and retrieve.
pub fn detail_view(detail: EmployeeDetail) -> EmployeeView<String> {
    view(detail.employee, detail.department_name)
}

/// Write shape, returned from create and update.
pub fn record_view(employee: Employee) -> EmployeeView<i64> {
    let department = employee.department_id;
    view(employee, department)
}

fn view<D>(employee: Employee, department: D) -> EmployeeView<D> {
    EmployeeView {
        id: employee.id,
        first_name: employee.first_name,
        last_name: employee.last_name,
        email: employee.email,
        salary: employee.salary,
        picture: employee.picture.as_deref().map(media::url_for),
        hired_at: employee.hired_at,
        department,
        is_manager: employee.is_manager,
        created_at: employee.created_at,
        updated_at: employee.updated_at,
    }
}

#[derive(Debug)]
pub enum PictureChange {
    Clear,
    Replace(ValidatedImage),
}

/// Validated employee fields. Absent fields are `None`.
#[derive(Debug, Default)]
pub struct EmployeeInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub salary: Option<Decimal>,
    pub hired_at: Option<Option<DateTime<Utc>>>,
    pub department_id: Option<i64>,
    pub is_manager: Option<bool>,
    pub picture: Option<PictureChange>,
}

impl EmployeeInput {
    fn picture_key(&self) -> Option<Option<String>> {
        match &self.picture {
            None => None,
            Some(PictureChange::Clear) => Some(None),
            Some(PictureChange::Replace(image)) => Some(Some(image.key.clone())),
        }
    }

    fn into_new(self) -> NewEmployee {
        let picture = self.picture_key().flatten();
        NewEmployee {
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            salary: self.salary.unwrap_or_default(),
            picture,
            hired_at: self.hired_at.flatten(),
            department_id: self.department_id.unwrap_or_default(),
            is_manager: self.is_manager.unwrap_or(false),
        }
    }

    fn into_changes(self) -> EmployeeChanges {
        let picture = self.picture_key();
        EmployeeChanges {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            salary: self.salary,
            picture,
            hired_at: self.hired_at,
            department_id: self.department_id,
            is_manager: self.is_manager,
        }
    }
}

/// Field-level checks that need no database access. Every problem found is
/// returned alongside whatever did parse, so relation checks can add to it.
pub async fn validate(payload: &Payload, partial: bool) -> (EmployeeInput, FieldErrors) {
    let mut reader = FieldReader::new(&payload.fields, partial);

    let first_name = reader.text("first_name", NAME_MAX);
    let last_name = reader.text("last_name", NAME_MAX);
    let email = reader.text("email", EMAIL_MAX);
    let email = email.and_then(|e| reader.check_email("email", e));
    let salary = reader.decimal("salary", SALARY_DIGITS, SALARY_PLACES);
    let hired_at = reader.timestamp("hired_at");
    let department_id = reader.reference("department");
    let is_manager = reader.boolean("is_manager");

    let picture = match payload.files.get("picture") {
        Some(upload) => match media::validate_image(upload).await {
            Ok(image) => Some(PictureChange::Replace(image)),
            Err(message) => {
                reader.error("picture", message);
                None
            }
        },
        None => match payload.fields.get("picture") {
            None => None,
            Some(Value::Null) => Some(PictureChange::Clear),
            Some(Value::String(s)) if s.is_empty() => Some(PictureChange::Clear),
            Some(_) => {
                reader.error("picture", NOT_A_FILE);
                None
            }
        },
    };

    let input = EmployeeInput {
        first_name,
        last_name,
        email,
        salary,
        hired_at,
        department_id,
        is_manager,
        picture,
    };
    (input, reader.into_errors())
}

/// Department must exist and email must be unique among other employees.
async fn check_relations(
    pool: &PgPool,
    input: &EmployeeInput,
    current: Option<i64>,
    errors: &mut FieldErrors,
) -> Result<(), sqlx::Error> {
    if let Some(department_id) = input.department_id {
        if !db::departments::exists(pool, department_id).await? {
            errors.add(
                "department",
                format!("Invalid pk \"{department_id}\" - object does not exist."),
            );
        }
    }
    if let Some(email) = input.email.as_deref() {
        if db::employees::email_taken(pool, email, current).await? {
            errors.add("email", EMAIL_TAKEN);
        }
    }
    Ok(())
}

/// Constraint violations that slipped past `check_relations` because of a
/// concurrent write are still reported as field errors.
fn write_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Validation(FieldErrors::single("email", EMAIL_TAKEN))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::Validation(FieldErrors::single(
                "department",
                "Invalid pk - object does not exist.",
            ))
        }
        _ => AppError::Database(e),
    }
}

/// Write a newly uploaded picture before the row that points at it.
async fn stage_picture(state: &SharedState, input: &EmployeeInput) -> Result<Option<String>, AppError> {
    match &input.picture {
        Some(PictureChange::Replace(image)) => {
            state.media.save(image).await?;
            Ok(Some(image.key.clone()))
        }
        _ => Ok(None),
    }
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<EmployeeView<String>>>, AppError> {
    auth.require_admin()?;
    let employees = db::employees::list_detailed(&state.pool).await?;
    Ok(Json(employees.into_iter().map(detail_view).collect()))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EmployeeView<i64>>), AppError> {
    auth.require_admin()?;
    let payload = payload::parse(&headers, body).await?;

    let (input, mut errors) = validate(&payload, false).await;
    check_relations(&state.pool, &input, None, &mut errors).await?;
    errors.into_result()?;

    let staged = stage_picture(&state, &input).await?;
    let employee = match db::employees::create(&state.pool, &input.into_new()).await {
        Ok(employee) => employee,
        Err(e) => {
            if let Some(key) = staged {
                state.media.remove(&key).await;
            }
            return Err(write_error(e));
        }
    };

    tracing::info!(id = employee.id, user = %auth.username, "employee created");
    Ok((StatusCode::CREATED, Json(record_view(employee))))
}

pub async fn get(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<EmployeeView<String>>, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;
    let employee = db::employees::find_detailed_by_id(&state.pool, id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(detail_view(employee)))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmployeeView<i64>>, AppError> {
    apply_update(auth, state, id, headers, body, false).await
}

pub async fn partial_update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmployeeView<i64>>, AppError> {
    apply_update(auth, state, id, headers, body, true).await
}

async fn apply_update(
    auth: AuthUser,
    state: SharedState,
    id: String,
    headers: HeaderMap,
    body: Bytes,
    partial: bool,
) -> Result<Json<EmployeeView<i64>>, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;

    // Unknown ids are a 404 whatever the body holds.
    let existing = db::employees::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(AppError::not_found)?;

    let payload = payload::parse(&headers, body).await?;
    let (input, mut errors) = validate(&payload, partial).await;
    check_relations(&state.pool, &input, Some(id), &mut errors).await?;
    errors.into_result()?;

    let picture_changed = input.picture.is_some();
    let staged = stage_picture(&state, &input).await?;

    let updated = match db::employees::update(&state.pool, id, &input.into_changes()).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(key) = staged {
                state.media.remove(&key).await;
            }
            return Err(write_error(e));
        }
    };

    let Some(employee) = updated else {
        // Deleted between the lookup and the update.
        if let Some(key) = staged {
            state.media.remove(&key).await;
        }
        return Err(AppError::not_found());
    };

    if picture_changed {
        if let Some(old) = existing.picture.as_deref() {
            if employee.picture.as_deref() != Some(old) {
                state.media.remove(old).await;
            }
        }
    }

    tracing::info!(id, user = %auth.username, partial, "employee updated");
    Ok(Json(record_view(employee)))
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;
    let id = parse_id(&id).ok_or_else(AppError::not_found)?;

    let employee = db::employees::delete(&state.pool, id)
        .await?
        .ok_or_else(AppError::not_found)?;

    if let Some(key) = employee.picture.as_deref() {
        state.media.remove(key).await;
    }

    tracing::info!(id, user = %auth.username, "employee deleted");
    Ok(StatusCode::NO_CONTENT)
}
