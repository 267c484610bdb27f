pub mod auth_tokens;
pub mod departments;
pub mod employees;
pub mod users;
