pub mod departments;
pub mod employees;
pub mod users;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Departments
        .route(
            "/departments/",
            get(departments::list).post(departments::create),
        )
        .route(
            "/departments/{id}",
            get(departments::get)
                .put(departments::update)
                .patch(departments::partial_update)
                .delete(departments::delete),
        )
        // Employees
        .route("/employees/", get(employees::list).post(employees::create))
        .route(
            "/employees/{id}",
            get(employees::get)
                .put(employees::update)
                .patch(employees::partial_update)
                .delete(employees::delete),
        )
        // Users
        .route(
            "/users/token/",
            post(users::issue_token).delete(users::revoke_token),
        )
        .route(
            "/users/me/",
            get(users::me)
                .put(users::update_me)
                .patch(users::partial_update_me),
        )
}
