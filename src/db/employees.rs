use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::{Employee, EmployeeDetail};

const DETAIL_SELECT: &str = "SELECT e.*, d.name AS department_name
     FROM employees e
     JOIN departments d ON d.id = e.department_id";

#[derive(Debug)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub salary: Decimal,
    pub picture: Option<String>,
    pub hired_at: Option<DateTime<Utc>>,
    pub department_id: i64,
    pub is_manager: bool,
}

/// Field values for an update. `None` leaves the column as it is; for the
/// nullable columns `Some(None)` clears it.
#[derive(Debug, Default)]
pub struct EmployeeChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub salary: Option<Decimal>,
    pub picture: Option<Option<String>>,
    pub hired_at: Option<Option<DateTime<Utc>>>,
    pub department_id: Option<i64>,
    pub is_manager: Option<bool>,
}

pub async fn list_detailed(pool: &PgPool) -> Result<Vec<EmployeeDetail>, sqlx::Error> {
    sqlx::query_as::<_, EmployeeDetail>(&format!("{DETAIL_SELECT} ORDER BY e.id"))
        .fetch_all(pool)
        .await
}

pub async fn find_detailed_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<EmployeeDetail>, sqlx::Error> {
    sqlx::query_as::<_, EmployeeDetail>(&format!("{DETAIL_SELECT} WHERE e.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Whether another employee already uses this email.
pub async fn email_taken(
    pool: &PgPool,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (
             SELECT 1 FROM employees
             WHERE email = $1 AND ($2::BIGINT IS NULL OR id <> $2)
         )",
    )
    .bind(email)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn create(pool: &PgPool, new: &NewEmployee) -> Result<Employee, sqlx::Error> {
    sqlx::query_as::<_, Employee>(
        "INSERT INTO employees
             (first_name, last_name, email, salary, picture, hired_at, department_id, is_manager)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .bind(new.salary)
    .bind(new.picture.as_deref())
    .bind(new.hired_at)
    .bind(new.department_id)
    .bind(new.is_manager)
    .fetch_one(pool)
    .await
}

/// Applies all changes in one statement and refreshes `updated_at`.
/// Returns `None` if the employee does not exist.
pub async fn update(
    pool: &PgPool,
    id: i64,
    changes: &EmployeeChanges,
) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(
        "UPDATE employees
         SET first_name = COALESCE($2, first_name),
             last_name = COALESCE($3, last_name),
             email = COALESCE($4, email),
             salary = COALESCE($5, salary),
             picture = CASE WHEN $6 THEN $7 ELSE picture END,
             hired_at = CASE WHEN $8 THEN $9 ELSE hired_at END,
             department_id = COALESCE($10, department_id),
             is_manager = COALESCE($11, is_manager),
             updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(changes.first_name.as_deref())
    .bind(changes.last_name.as_deref())
    .bind(changes.email.as_deref())
    .bind(changes.salary)
    .bind(changes.picture.is_some())
    .bind(changes.picture.clone().flatten())
    .bind(changes.hired_at.is_some())
    .bind(changes.hired_at.flatten())
    .bind(changes.department_id)
    .bind(changes.is_manager)
    .fetch_optional(pool)
    .await
}

/// Deletes and returns the removed row so its picture can be cleaned up.
pub async fn delete(pool: &PgPool, id: i64) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>("DELETE FROM employees WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}
