mod auth_token;
mod department;
mod employee;
mod user;

pub use auth_token::{AuthToken, TokenOwner};
pub use department::Department;
pub use employee::{Employee, EmployeeDetail};
pub use user::User;
