use sqlx::PgPool;

use crate::models::Department;

/// Field values for an update. `None` leaves the column as it is.
#[derive(Debug, Default)]
pub struct DepartmentChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn list(pool: &PgPool) -> Result<Vec<Department>, sqlx::Error> {
    sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    description: &str,
) -> Result<Department, sqlx::Error> {
    sqlx::query_as::<_, Department>(
        "INSERT INTO departments (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Department>, sqlx::Error> {
    sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM departments WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Applies all changes in one statement and refreshes `updated_at`.
/// Returns `None` if the department does not exist.
pub async fn update(
    pool: &PgPool,
    id: i64,
    changes: &DepartmentChanges,
) -> Result<Option<Department>, sqlx::Error> {
    sqlx::query_as::<_, Department>(
        "UPDATE departments
         SET name = COALESCE($2, name),
             description = COALESCE($3, description),
             updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(changes.name.as_deref())
    .bind(changes.description.as_deref())
    .fetch_optional(pool)
    .await
}

/// Fails with a foreign key violation while employees still reference the department.
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM departments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
