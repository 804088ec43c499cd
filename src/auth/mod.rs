use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod secrets;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/social-login", post(handlers::social_login))
        .route("/auth/me", get(handlers::get_me))
        .route("/auth/forgotpassword", post(handlers::forgot_password))
        .route("/auth/resetpassword/:token", put(handlers::reset_password))
        .route("/auth/verify-email/:token", get(handlers::verify_email))
        .route(
            "/auth/verify-email-otp/:otp/:email",
            get(handlers::verify_email_otp),
        )
        .route(
            "/auth/resend-verification",
            post(handlers::resend_verification),
        )
        .route("/auth/logout", get(handlers::logout))
}
