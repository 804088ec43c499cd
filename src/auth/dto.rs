use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for social login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Body of `PUT /auth/resetpassword/:token`.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Public part of the user returned to clients. Password hash and all
/// issued secrets are deliberately absent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProjection {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub referral_code: String,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserProjection {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            referral_code: user.referral_code.clone(),
            email_verified: user.email_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Response carrying a freshly minted session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub user: UserProjection,
}

/// Registration outcome without a session token; login follows verification.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: RegisteredUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserProjection,
}

/// Plain `{success, message}` envelope.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password_hash: "$argon2id$not-a-real-hash".into(),
            photo: None,
            social_providers: sqlx::types::Json(HashMap::new()),
            is_active: true,
            email_verified: true,
            last_login: None,
            referral_code: "AB12CD".into(),
            reset_password_digest: Some("deadbeef".into()),
            reset_password_expires: None,
            email_verification_digest: None,
            email_verification_expires: None,
            email_verification_otp: Some("123456".into()),
            email_verification_otp_expires: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn projection_uses_camel_case_wire_names() {
        let json = serde_json::to_string(&UserProjection::from(&sample_user())).unwrap();
        assert!(json.contains("\"isActive\":true"));
        assert!(json.contains("\"referralCode\":\"AB12CD\""));
        assert!(json.contains("\"emailVerified\":true"));
        assert!(json.contains("\"createdAt\""));
    }

    #[test]
    fn projection_never_carries_password_or_secrets() {
        let json = serde_json::to_string(&UserProjection::from(&sample_user())).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("deadbeef"));
        assert!(!json.contains("123456"));
    }

    #[test]
    fn social_login_request_accepts_camel_case() {
        let body = r#"{"provider":"google","providerId":"g-1","email":"a@b.c","accessToken":"tok"}"#;
        let req: SocialLoginRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.provider_id, "g-1");
        assert_eq!(req.access_token.as_deref(), Some("tok"));
        assert!(req.name.is_none());
    }
}
