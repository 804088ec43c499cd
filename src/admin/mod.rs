use crate::state::AppState;
use axum::{
    routing::{get, put},
    Router,
};

mod dto;
pub mod handlers;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(handlers::dashboard))
        .route("/admin/users", get(handlers::list_users))
        .route(
            "/admin/users/:id",
            get(handlers::get_user).delete(handlers::delete_user),
        )
        .route("/admin/users/:id/status", put(handlers::update_user_status))
}
