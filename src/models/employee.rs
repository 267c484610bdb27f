use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Employee {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub salary: Decimal,
    /// Storage key under the media root, e.g. `pictures/<uuid>.png`.
    pub picture: Option<String>,
    pub hired_at: Option<DateTime<Utc>>,
    pub department_id: i64,
    pub is_manager: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An employee row joined with the name of its department.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmployeeDetail {
    #[sqlx(flatten)]
    pub employee: Employee,
    pub department_name: String,
}
