use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Message for both unknown-email and wrong-password logins, kept identical
/// to avoid account enumeration.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// User-facing failure taxonomy. Every variant except `Internal` maps to a
/// 4xx-equivalent outcome; `Internal` is logged with full detail and returns
/// a generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidOrExpired(String),

    #[error("Email could not be sent")]
    DeliveryFailed,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthenticated(INVALID_CREDENTIALS.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            // Conflict is 400 on the wire: clients of the original API key
            // off that status for duplicate registrations.
            ApiError::InvalidInput(_)
            | ApiError::InvalidOrExpired(_)
            | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DeliveryFailed | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::invalid_credentials().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidOrExpired("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::DeliveryFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused to 10.0.0.1"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthenticated_message_does_not_distinguish_causes() {
        assert_eq!(
            ApiError::invalid_credentials().to_string(),
            INVALID_CREDENTIALS
        );
    }
}
